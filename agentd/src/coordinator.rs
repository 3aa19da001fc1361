//! Team Coordinator (spec §4.12)
//!
//! Decomposes a goal into a Task Graph, runs claimed batches across a
//! worker pool under a per-task deadline, reconciles on each trigger, and
//! synthesizes a final summary. Worker execution itself is injected via
//! [`WorkerFn`] so the coordinator doesn't need to know whether a worker is
//! a full [`crate::agent::AgentTurnLoop`] or a test double.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use graphstore::{EventLog, HarnessEvent, HarnessEventType, Patch, Task, TaskGraph, TaskStatus};
use serde_json::{json, Value};
use tracing::debug;

use crate::cancel::CancellationSignal;
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::mailbox::{Mailbox, ListOptions, MessageType};
use crate::reconcile::{ReconcileInput, ReconcileLoop, ReconcileTrigger};
use crate::runtime_policy::{Phase, RuntimePolicy};
use crate::state_tracker::{TeamStateTracker, WorkerHeartbeat, WorkerStatus};

#[derive(Debug, Clone)]
pub struct WorkerTask {
    pub task_id: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    Done(String),
    Failed(String),
}

/// Executes a single worker attempt at a claimed task. Boxed so callers can
/// plug in a real `AgentTurnLoop` or a test stub without the coordinator
/// depending on either concretely.
pub type WorkerFn = Arc<dyn Fn(WorkerTask, CancellationSignal) -> BoxFuture<'static, WorkerOutcome> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct RegressionReport {
    pub mutable_graph_flag: bool,
    pub reconcile_flag: bool,
    pub replay_equivalent: Option<bool>,
    pub caps_enforced: bool,
    pub heartbeat_policy_ok: bool,
    pub trust_gating_flag: bool,
}

#[derive(Debug, Clone)]
pub struct TeamRunResult {
    pub completed: bool,
    pub summary: String,
    pub tasks: Vec<Task>,
    pub regression_report: Option<RegressionReport>,
    pub error: Option<String>,
}

pub struct TeamCoordinatorConfig {
    pub planner: Arc<dyn LlmClient>,
    pub worker: WorkerFn,
    pub worker_restart_limit: u32,
    pub verify_before_complete: bool,
    pub verifier: Option<WorkerFn>,
}

/// Given a high-level goal, drives planning, batched worker execution, and
/// synthesis over a `TaskGraph`.
pub struct TeamCoordinator {
    config: TeamCoordinatorConfig,
    pub policy: RuntimePolicy,
    pub state: TeamStateTracker,
    pub mailbox: Mailbox,
    reconcile: ReconcileLoop,
    event_log: Arc<EventLog>,
}

impl TeamCoordinator {
    pub fn new(config: TeamCoordinatorConfig, policy: RuntimePolicy, run_id: impl Into<String>, goal: impl Into<String>) -> Self {
        let goal = goal.into();
        let reconcile = ReconcileLoop::new(policy.flags.reconcile, policy.caps.max_tasks, "orchestrator");
        Self {
            config,
            policy,
            state: TeamStateTracker::new(run_id, goal),
            mailbox: Mailbox::new(),
            reconcile,
            event_log: EventLog::in_memory(),
        }
    }

    async fn log(&self, event_type: HarnessEventType, data: Value) {
        self.event_log.log(HarnessEvent::new(event_type, "coordinator", data)).await;
    }

    pub async fn run(&mut self, goal: &str) -> TeamRunResult {
        debug!(%goal, "TeamCoordinator::run: called");
        let started = Instant::now();

        if let Err(err) = self.policy.transition(Phase::Planning) {
            return TeamRunResult { completed: false, summary: String::new(), tasks: vec![], regression_report: None, error: Some(err.to_string()) };
        }

        let tasks = match self.plan(goal).await {
            Ok(tasks) => tasks,
            Err(err) => {
                let _ = self.policy.transition(Phase::Failed);
                return TeamRunResult { completed: false, summary: String::new(), tasks: vec![], regression_report: None, error: Some(err) };
            }
        };

        let mut graph = match TaskGraph::new(tasks) {
            Ok(graph) => graph,
            Err(err) => {
                let _ = self.policy.transition(Phase::Failed);
                return TeamRunResult { completed: false, summary: String::new(), tasks: vec![], regression_report: None, error: Some(err.to_string()) };
            }
        };
        let original_tasks: Vec<Task> = graph.tasks().into_iter().cloned().collect();
        self.log(HarnessEventType::Other, json!({"kind": "plan_created", "taskCount": graph.tasks().len()})).await;

        if self.policy.transition(Phase::Executing).is_err() {
            return TeamRunResult { completed: false, summary: String::new(), tasks: vec![], regression_report: None, error: Some("cannot start executing".into()) };
        }

        let mut restarts: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
        let mut requeues: std::collections::HashSet<String> = std::collections::HashSet::new();

        while !graph.is_complete() {
            if started.elapsed() > Duration::from_millis(self.policy.caps.max_runtime_ms) {
                let _ = self.policy.transition(Phase::Failed);
                return TeamRunResult {
                    completed: false,
                    summary: String::new(),
                    tasks: graph.tasks().into_iter().cloned().collect(),
                    regression_report: None,
                    error: Some("runtime budget exceeded".to_string()),
                };
            }

            let claimed = match graph.claim_ready_tasks(self.policy.caps.max_workers) {
                Ok(tasks) => tasks,
                Err(err) => {
                    let _ = self.policy.transition(Phase::Failed);
                    return TeamRunResult { completed: false, summary: String::new(), tasks: graph.tasks().into_iter().cloned().collect(), regression_report: None, error: Some(err.to_string()) };
                }
            };
            self.log(HarnessEventType::Other, json!({"kind": "batch_claimed", "count": claimed.len()})).await;

            if claimed.is_empty() {
                let changed = graph.mark_blocked_tasks_as_failed();
                self.log(HarnessEventType::Other, json!({"kind": "tasks_dependency_failed", "count": changed})).await;
                self.reconcile_now(ReconcileTrigger::DependencyFailure, &graph, &[]);

                if changed == 0 && !graph.is_complete() {
                    let _ = self.policy.transition(Phase::Failed);
                    return TeamRunResult {
                        completed: false,
                        summary: String::new(),
                        tasks: graph.tasks().into_iter().cloned().collect(),
                        regression_report: None,
                        error: Some("no progress possible: pending tasks remain with no ready work".to_string()),
                    };
                }
                continue;
            }

            let attempts = claimed.iter().map(|task| {
                let signal = CancellationSignal::new();
                let worker_fn = self.config.worker.clone();
                let worker_task = WorkerTask { task_id: task.id.clone(), description: task.description.clone() };
                let timeout_ms = self.policy.caps.worker_timeout_ms;
                async move {
                    let fut = worker_fn(worker_task, signal.clone());
                    match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            signal.cancel();
                            WorkerOutcome::Failed(format!("Worker timed out after {timeout_ms}ms"))
                        }
                    }
                }
            });

            for task in &claimed {
                self.state.upsert_heartbeat(WorkerHeartbeat::new(task.id.clone(), WorkerStatus::Busy));
                self.log(HarnessEventType::Other, json!({"kind": "worker_attempt_started", "taskId": task.id})).await;
            }

            let outcomes: Vec<WorkerOutcome> = futures::future::join_all(attempts).await;

            for (task, outcome) in claimed.iter().zip(outcomes) {
                let restartable = matches!(&outcome, WorkerOutcome::Failed(reason) if reason.contains("killed by Beholder") || reason.contains("timed out"));
                let attempt_count = restarts.entry(task.id.clone()).or_insert(0);

                if restartable && *attempt_count < self.config.worker_restart_limit {
                    *attempt_count += 1;
                    self.state.upsert_heartbeat(WorkerHeartbeat::new(task.id.clone(), WorkerStatus::Restarting));
                    self.log(HarnessEventType::Other, json!({"kind": "worker_attempt_finished", "taskId": task.id, "restarted": true})).await;
                    let patch = Patch::new(vec![graphstore::Operation::UpdateTask {
                        task_id: task.id.clone(),
                        patch: graphstore::graph::TaskPatch { status: Some(TaskStatus::Pending), started_at: Some(0), ..Default::default() },
                    }]);
                    let expected = graph.graph_version();
                    graph.apply_patch(patch, expected, "coordinator", "worker_restart");
                    continue;
                }

                self.state.upsert_heartbeat(WorkerHeartbeat::new(
                    &task.id,
                    match &outcome {
                        WorkerOutcome::Done(_) => WorkerStatus::Done,
                        WorkerOutcome::Failed(_) => WorkerStatus::Failed,
                    },
                ));
                self.log(HarnessEventType::Other, json!({"kind": "worker_attempt_finished", "taskId": task.id})).await;

                match outcome {
                    WorkerOutcome::Done(result) => {
                        if self.config.verify_before_complete {
                            graph.submit_result(&task.id, result, "coordinator");
                        } else {
                            let expected = graph.graph_version();
                            graph.apply_patch(
                                Patch::new(vec![graphstore::Operation::UpdateTask {
                                    task_id: task.id.clone(),
                                    patch: graphstore::graph::TaskPatch {
                                        status: Some(TaskStatus::Done),
                                        result: Some(result),
                                        completed_at: Some(graphstore::now_ms()),
                                        ..Default::default()
                                    },
                                }]),
                                expected,
                                "coordinator",
                                "worker_result",
                            );
                        }
                    }
                    WorkerOutcome::Failed(error) => {
                        let expected = graph.graph_version();
                        graph.apply_patch(
                            Patch::new(vec![graphstore::Operation::UpdateTask {
                                task_id: task.id.clone(),
                                patch: graphstore::graph::TaskPatch {
                                    status: Some(TaskStatus::Failed),
                                    error: Some(error),
                                    completed_at: Some(graphstore::now_ms()),
                                    ..Default::default()
                                },
                            }]),
                            expected,
                            "coordinator",
                            "worker_result",
                        );
                    }
                }
                self.log(HarnessEventType::Other, json!({"kind": "task_resolved", "taskId": task.id})).await;
            }

            if self.config.verify_before_complete {
                self.run_verification(&mut graph, &mut requeues).await;
            }

            graph.mark_blocked_tasks_as_failed();
            let stale: Vec<WorkerHeartbeat> =
                self.state.get_stale_heartbeats(self.policy.caps.heartbeat_staleness_ms as i64, chrono::Utc::now()).into_iter().cloned().collect();
            self.reconcile_now(ReconcileTrigger::TaskResolved, &graph, &stale);
        }

        let _ = self.policy.transition(Phase::Synthesizing);
        let summary = self.synthesize(goal, &graph).await;
        let success = graph.tasks().iter().all(|t| t.status == TaskStatus::Done);
        self.log(HarnessEventType::Other, json!({"kind": if success { "run_completed" } else { "run_failed" }})).await;
        let _ = self.policy.transition(if success { Phase::Completed } else { Phase::Failed });
        self.state.finalize(success);

        let regression_report = if self.policy.flags.regression_gates {
            Some(RegressionReport {
                mutable_graph_flag: self.policy.flags.mutable_graph,
                reconcile_flag: self.policy.flags.reconcile,
                replay_equivalent: if self.policy.flags.trace_replay {
                    Some(TaskGraph::replay(original_tasks.clone(), &graph.get_events()).is_ok())
                } else {
                    None
                },
                caps_enforced: graph.tasks().len() <= self.policy.caps.max_tasks,
                heartbeat_policy_ok: self.state.get_stale_heartbeats(self.policy.caps.heartbeat_staleness_ms as i64, chrono::Utc::now()).is_empty(),
                trust_gating_flag: self.policy.flags.trust_gating,
            })
        } else {
            None
        };

        TeamRunResult {
            completed: success,
            summary,
            tasks: graph.tasks().into_iter().cloned().collect(),
            regression_report,
            error: None,
        }
    }

    fn reconcile_now(&mut self, trigger: ReconcileTrigger, graph: &TaskGraph, stale: &[WorkerHeartbeat]) {
        self.state.set_trigger(format!("{trigger:?}"));
        let _ = self.policy.transition(Phase::Reconciling);
        let pending = graph.tasks().iter().filter(|t| t.status == TaskStatus::Pending).count();
        let needs_context: Vec<String> = self
            .mailbox
            .list("orchestrator", &ListOptions { message_type: Some(MessageType::NeedsContext), ..Default::default() })
            .into_iter()
            .map(|m| m.from)
            .collect();
        self.reconcile.reconcile(
            ReconcileInput { trigger, pending_task_count: pending, needs_context: &needs_context, stale_heartbeats: stale },
            &self.mailbox,
        );
        let _ = self.policy.transition(Phase::Executing);
    }

    async fn run_verification(&self, graph: &mut TaskGraph, requeued: &mut std::collections::HashSet<String>) {
        let awaiting: Vec<String> = graph.get_awaiting_review().iter().map(|t| t.id.clone()).collect();
        for task_id in awaiting {
            let Some(task) = graph.get(&task_id) else { continue };
            let approved = if let Some(verifier) = &self.config.verifier {
                let signal = CancellationSignal::new();
                matches!(
                    verifier(WorkerTask { task_id: task.id.clone(), description: task.description.clone() }, signal).await,
                    WorkerOutcome::Done(_)
                )
            } else {
                self.inline_verify(task).await
            };

            if approved {
                graph.complete_task(&task_id, "coordinator");
            } else if !requeued.contains(&task_id) {
                requeued.insert(task_id.clone());
                graph.requeue_task(&task_id, "coordinator");
            } else {
                graph.reject_task(&task_id, "verification failed after requeue", "coordinator");
            }
        }
    }

    async fn inline_verify(&self, task: &Task) -> bool {
        let prompt = format!(
            "Task '{}' reported result:\n{}\n\nReply with JSON {{\"approved\": bool, \"reason\": string}}.",
            task.description,
            task.result.as_deref().unwrap_or("")
        );
        let request = CompletionRequest {
            system_prompt: "You review completed sub-tasks for a multi-agent run.".to_string(),
            messages: vec![Message::user(prompt)],
            tools: vec![],
            max_tokens: 256,
            signal: None,
        };
        match self.config.planner.complete(request).await {
            Ok(response) => response
                .content
                .as_deref()
                .and_then(|t| serde_json::from_str::<Value>(t).ok())
                .and_then(|v| v.get("approved").and_then(Value::as_bool))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn plan(&self, goal: &str) -> Result<Vec<Task>, String> {
        let prompt = format!(
            "Decompose this goal into at most 5 tasks. Goal: {goal}\n\n\
             Reply with a JSON array of objects: {{\"id\": string, \"description\": string, \"blockedBy\": [string]?, \"priority\": number?}}."
        );
        let request = CompletionRequest {
            system_prompt: "You are a planner for a supervised multi-agent team.".to_string(),
            messages: vec![Message::user(prompt)],
            tools: vec![],
            max_tokens: 1024,
            signal: None,
        };
        let response = self.config.planner.complete(request).await.map_err(|e| e.to_string())?;
        let text = response.content.ok_or("planner returned no content")?;
        let raw: Vec<Value> = serde_json::from_str(&text).map_err(|e| format!("planner returned invalid JSON: {e}"))?;
        if raw.len() > 5 {
            return Err("planner returned more than 5 tasks".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        let mut tasks = Vec::new();
        for entry in &raw {
            let id = entry.get("id").and_then(Value::as_str).ok_or("task missing id")?.to_string();
            let description = entry.get("description").and_then(Value::as_str).ok_or("task missing description")?.to_string();
            if !seen.insert(id.clone()) {
                return Err(format!("duplicate task id '{id}'"));
            }
            let blocked_by: Vec<String> = entry
                .get("blockedBy")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            let priority = entry.get("priority").and_then(Value::as_f64).unwrap_or(0.0);
            tasks.push(Task::new(id, description).with_priority(priority).with_blocked_by(blocked_by));
        }
        for task in &tasks {
            for dep in &task.blocked_by {
                if !seen.contains(dep) {
                    return Err(format!("task '{}' references unknown dependency '{dep}'", task.id));
                }
            }
        }
        if tasks.is_empty() {
            return Err("planner produced zero tasks".to_string());
        }
        Ok(tasks)
    }

    async fn synthesize(&self, goal: &str, graph: &TaskGraph) -> String {
        let tasks_summary: String = graph
            .tasks()
            .iter()
            .map(|t| format!("- {} ({:?}): {}", t.id, t.status, t.result.clone().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!("Goal: {goal}\n\nTask outcomes:\n{tasks_summary}\n\nWrite a short summary of the run.");
        let request = CompletionRequest {
            system_prompt: "You summarize completed multi-agent runs for a human operator.".to_string(),
            messages: vec![Message::user(prompt)],
            tools: vec![],
            max_tokens: 512,
            signal: None,
        };
        match self.config.planner.complete(request).await {
            Ok(response) => response.content.unwrap_or_default(),
            Err(err) => format!("synthesis failed: {err}"),
        }
    }
}
