//! Dependency-aware, versioned, patchable, replayable task graph
//!
//! `apply_patch` is the sole mutation entry point (spec §4.8, §9 design
//! notes: "expose applyPatch as the sole mutation entry, returning
//! structured results"). Grounded on `td/src/scheduler/core.rs`'s
//! mutex-guarded-inner-state pattern for how a single owner serializes
//! mutation while readers take snapshots.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::now_ms;
use crate::task::{Task, TaskStatus};

/// A single graph mutation primitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    AddTask { task: Task, index: Option<usize> },
    UpdateTask { task_id: String, patch: TaskPatch },
    RemoveTask { task_id: String },
}

/// Partial, field-level update applied to an existing task by `update_task`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<std::collections::BTreeSet<String>>,
}

/// An ordered batch of operations applied atomically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Patch {
    pub operations: Vec<Operation>,
}

impl Patch {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }
}

const SCHEMA_VERSION: u32 = 1;

/// A recorded, replayable description of a patch applied to the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationEvent {
    pub id: String,
    pub schema_version: u32,
    pub actor: String,
    pub expected_version: u64,
    pub graph_version: u64,
    pub timestamp: chrono::DateTime<Utc>,
    pub reason: String,
    pub patch: Patch,
}

/// Result of `apply_patch`.
#[derive(Debug, Clone)]
pub enum PatchOutcome {
    Applied { graph_version: u64, event: MutationEvent },
    Conflict { expected: u64, actual: u64 },
    Rejected { error: String },
}

impl PatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PatchOutcome::Applied { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("a task graph requires at least one task")]
    Empty,
    #[error("duplicate task id '{0}'")]
    DuplicateId(String),
    #[error("task '{0}' depends on itself")]
    SelfDependency(String),
    #[error("task '{task}' depends on unknown task '{dep}'")]
    UnknownDependency { task: String, dep: String },
    #[error("dependency cycle detected involving task '{0}'")]
    Cycle(String),
    #[error("claim limit must be greater than zero")]
    InvalidClaimLimit,
    #[error("replay diverged at event {event_id}: expected graph_version {expected}, got {actual}")]
    ReplayMismatch { event_id: String, expected: u64, actual: u64 },
    #[error("replay patch failed: {0}")]
    ReplayRejected(String),
    #[error("replay hit a version conflict at event {0}")]
    ReplayConflict(String),
}

/// Dependency-aware, versioned, patchable, replayable task graph.
pub struct TaskGraph {
    tasks: HashMap<String, Task>,
    order: Vec<String>,
    graph_version: u64,
    events: Vec<MutationEvent>,
}

impl TaskGraph {
    /// Construct a graph from an initial task list. Normalizes id/description,
    /// dedupes `blocked_by`, and validates references and acyclicity.
    pub fn new(tasks: Vec<Task>) -> Result<Self, GraphError> {
        if tasks.is_empty() {
            return Err(GraphError::Empty);
        }
        let mut map = HashMap::new();
        let mut order = Vec::new();
        for mut task in tasks {
            task.id = task.id.trim().to_string();
            task.description = task.description.trim().to_string();
            if map.contains_key(&task.id) {
                return Err(GraphError::DuplicateId(task.id));
            }
            if task.blocked_by.contains(&task.id) {
                return Err(GraphError::SelfDependency(task.id));
            }
            order.push(task.id.clone());
            map.insert(task.id.clone(), task);
        }
        Self::validate_invariants(&map, &order)?;
        Ok(Self { tasks: map, order, graph_version: 0, events: Vec::new() })
    }

    pub fn graph_version(&self) -> u64 {
        self.graph_version
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Snapshot of tasks in insertion order.
    pub fn tasks(&self) -> Vec<&Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id)).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.tasks.values().all(|t| t.status.is_terminal())
    }

    pub fn get_events(&self) -> Vec<MutationEvent> {
        self.events.clone()
    }

    fn validate_invariants(tasks: &HashMap<String, Task>, order: &[String]) -> Result<(), GraphError> {
        if order.len() != tasks.len() {
            return Err(GraphError::ReplayRejected("order/task map out of sync".into()));
        }
        let order_set: HashSet<&String> = order.iter().collect();
        if order_set.len() != order.len() {
            return Err(GraphError::ReplayRejected("duplicate entries in order list".into()));
        }
        for id in order {
            if !tasks.contains_key(id) {
                return Err(GraphError::ReplayRejected(format!("dangling order entry '{id}'")));
            }
        }
        for task in tasks.values() {
            if task.blocked_by.contains(&task.id) {
                return Err(GraphError::SelfDependency(task.id.clone()));
            }
            for dep in &task.blocked_by {
                if !tasks.contains_key(dep) {
                    return Err(GraphError::UnknownDependency { task: task.id.clone(), dep: dep.clone() });
                }
            }
        }
        Self::check_acyclic(tasks)?;
        Ok(())
    }

    /// Iterative three-color DFS cycle detection.
    fn check_acyclic(tasks: &HashMap<String, Task>) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }
        let mut colors: HashMap<&str, Color> = tasks.keys().map(|k| (k.as_str(), Color::White)).collect();

        for start in tasks.keys() {
            if colors[start.as_str()] != Color::White {
                continue;
            }
            // (node, next-dep-index) stack for iterative DFS
            let mut stack: Vec<(&str, std::collections::btree_set::Iter<String>)> =
                vec![(start.as_str(), tasks[start.as_str()].blocked_by.iter())];
            colors.insert(start.as_str(), Color::Gray);

            while let Some((node, mut deps)) = stack.pop() {
                if let Some(dep) = deps.next() {
                    stack.push((node, deps));
                    match colors.get(dep.as_str()).copied().unwrap_or(Color::White) {
                        Color::White => {
                            colors.insert(dep.as_str(), Color::Gray);
                            stack.push((dep.as_str(), tasks[dep.as_str()].blocked_by.iter()));
                        }
                        Color::Gray => return Err(GraphError::Cycle(dep.clone())),
                        Color::Black => {}
                    }
                } else {
                    colors.insert(node, Color::Black);
                }
            }
        }
        Ok(())
    }

    /// Select up to `limit` ready `pending` tasks (all deps `done`), sorted by
    /// priority descending then insertion order, mark them `in_progress`.
    pub fn claim_ready_tasks(&mut self, limit: usize) -> Result<Vec<Task>, GraphError> {
        if limit == 0 {
            return Err(GraphError::InvalidClaimLimit);
        }
        let done_ids: HashSet<String> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Done)
            .map(|t| t.id.clone())
            .collect();

        let mut candidates: Vec<(usize, &Task)> = self
            .order
            .iter()
            .enumerate()
            .filter_map(|(idx, id)| self.tasks.get(id).map(|t| (idx, t)))
            .filter(|(_, t)| t.is_ready(&done_ids))
            .collect();

        candidates.sort_by(|(idx_a, a), (idx_b, b)| {
            b.priority.partial_cmp(&a.priority).unwrap_or(std::cmp::Ordering::Equal).then(idx_a.cmp(idx_b))
        });
        candidates.truncate(limit);
        let ids: Vec<String> = candidates.into_iter().map(|(_, t)| t.id.clone()).collect();

        let now = now_ms();
        let operations = ids
            .iter()
            .map(|id| Operation::UpdateTask {
                task_id: id.clone(),
                patch: TaskPatch { status: Some(TaskStatus::InProgress), started_at: Some(now), ..Default::default() },
            })
            .collect();

        match self.apply_internal(Patch::new(operations), "scheduler", "claim_ready_tasks") {
            PatchOutcome::Applied { .. } => Ok(ids.iter().filter_map(|id| self.tasks.get(id).cloned()).collect()),
            PatchOutcome::Rejected { error } => Err(GraphError::ReplayRejected(error)),
            PatchOutcome::Conflict { .. } => unreachable!("internal patches always target the current version"),
        }
    }

    /// Mark any `pending` task whose dependency is `failed` as `failed`,
    /// iterating to a fixed point (a chain of failures cascades fully).
    pub fn mark_blocked_tasks_as_failed(&mut self) -> usize {
        let mut total = 0;
        loop {
            let failed_ids: HashSet<String> =
                self.tasks.values().filter(|t| t.status == TaskStatus::Failed).map(|t| t.id.clone()).collect();

            let mut operations = Vec::new();
            for task in self.tasks.values() {
                if task.status != TaskStatus::Pending {
                    continue;
                }
                if let Some(dep) = task.blocked_by.iter().find(|d| failed_ids.contains(*d)) {
                    operations.push(Operation::UpdateTask {
                        task_id: task.id.clone(),
                        patch: TaskPatch {
                            status: Some(TaskStatus::Failed),
                            error: Some(format!("Blocked by failed dependency \"{dep}\"")),
                            completed_at: Some(now_ms()),
                            ..Default::default()
                        },
                    });
                }
            }
            if operations.is_empty() {
                break;
            }
            let n = operations.len();
            match self.apply_internal(Patch::new(operations), "scheduler", "dependency_cascade") {
                PatchOutcome::Applied { .. } => total += n,
                _ => break,
            }
        }
        total
    }

    /// Apply a patch iff `expected_version` matches the current version.
    /// Never mutates state on conflict or validation failure.
    pub fn apply_patch(&mut self, patch: Patch, expected_version: u64, actor: &str, reason: &str) -> PatchOutcome {
        if expected_version != self.graph_version {
            return PatchOutcome::Conflict { expected: expected_version, actual: self.graph_version };
        }

        let mut tasks = self.tasks.clone();
        let mut order = self.order.clone();

        for op in &patch.operations {
            if let Err(error) = Self::apply_operation(&mut tasks, &mut order, op) {
                return PatchOutcome::Rejected { error };
            }
        }
        if let Err(error) = Self::validate_invariants(&tasks, &order) {
            return PatchOutcome::Rejected { error: error.to_string() };
        }

        self.tasks = tasks;
        self.order = order;
        self.graph_version += 1;

        let event = MutationEvent {
            id: format!("evt-{}", uuid::Uuid::now_v7()),
            schema_version: SCHEMA_VERSION,
            actor: actor.to_string(),
            expected_version,
            graph_version: self.graph_version,
            timestamp: Utc::now(),
            reason: reason.to_string(),
            patch,
        };
        self.events.push(event.clone());
        PatchOutcome::Applied { graph_version: self.graph_version, event }
    }

    fn apply_internal(&mut self, patch: Patch, actor: &str, reason: &str) -> PatchOutcome {
        let expected = self.graph_version;
        self.apply_patch(patch, expected, actor, reason)
    }

    fn apply_operation(tasks: &mut HashMap<String, Task>, order: &mut Vec<String>, op: &Operation) -> Result<(), String> {
        match op {
            Operation::AddTask { task, index } => {
                let mut task = task.clone();
                task.id = task.id.trim().to_string();
                if tasks.contains_key(&task.id) {
                    return Err(format!("task id '{}' already exists", task.id));
                }
                let idx = index.unwrap_or(order.len()).min(order.len());
                order.insert(idx, task.id.clone());
                tasks.insert(task.id.clone(), task);
                Ok(())
            }
            Operation::RemoveTask { task_id } => {
                if !tasks.contains_key(task_id) {
                    return Err(format!("unknown task id '{task_id}'"));
                }
                if let Some(dependent) = tasks.values().find(|t| t.blocked_by.contains(task_id)) {
                    return Err(format!("cannot remove '{task_id}': task '{}' depends on it", dependent.id));
                }
                tasks.remove(task_id);
                order.retain(|id| id != task_id);
                Ok(())
            }
            Operation::UpdateTask { task_id, patch } => {
                let task = tasks.get_mut(task_id).ok_or_else(|| format!("unknown task id '{task_id}'"))?;
                if let Some(new_status) = patch.status {
                    if task.status.is_terminal() && new_status != task.status {
                        return Err(format!(
                            "task '{task_id}' is terminal ({:?}); cannot transition to {:?}",
                            task.status, new_status
                        ));
                    }
                    task.status = new_status;
                }
                if let Some(v) = &patch.description {
                    task.description = v.clone();
                }
                if let Some(v) = patch.priority {
                    task.priority = v;
                }
                if let Some(v) = &patch.assigned_to {
                    task.assigned_to = Some(v.clone());
                }
                if let Some(v) = &patch.result {
                    task.result = Some(v.clone());
                }
                if let Some(v) = &patch.error {
                    task.error = Some(v.clone());
                }
                if let Some(v) = patch.started_at {
                    task.started_at = Some(v);
                }
                if let Some(v) = patch.completed_at {
                    task.completed_at = Some(v);
                }
                if let Some(v) = &patch.blocked_by {
                    if v.contains(task_id) {
                        return Err(format!("task '{task_id}' cannot depend on itself"));
                    }
                    task.blocked_by = v.clone();
                }
                Ok(())
            }
        }
    }

    /// Worker reports a result without unilaterally closing the task: moves
    /// `in_progress -> deferred` with `result` attached. A deferred task sits
    /// in the awaiting-review set until a reviewer calls `complete_task`,
    /// `reject_task`, or `requeue_task` on it.
    pub fn submit_result(&mut self, task_id: &str, result: impl Into<String>, actor: &str) -> PatchOutcome {
        let Some(task) = self.tasks.get(task_id) else {
            return PatchOutcome::Rejected { error: format!("unknown task id '{task_id}'") };
        };
        if task.status != TaskStatus::InProgress {
            return PatchOutcome::Rejected {
                error: format!("task '{task_id}' is {:?}, not in_progress; cannot submit a result", task.status),
            };
        }
        let patch = Patch::new(vec![Operation::UpdateTask {
            task_id: task_id.to_string(),
            patch: TaskPatch { status: Some(TaskStatus::Deferred), result: Some(result.into()), ..Default::default() },
        }]);
        self.apply_internal(patch, actor, "submit_result")
    }

    /// Tasks currently sitting in the `deferred` (awaiting-review) state.
    pub fn get_awaiting_review(&self) -> Vec<&Task> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| t.status == TaskStatus::Deferred)
            .collect()
    }

    /// Reviewer accepts a deferred result: `deferred -> done`.
    pub fn complete_task(&mut self, task_id: &str, actor: &str) -> PatchOutcome {
        self.transition_deferred(task_id, TaskStatus::Done, None, actor, "complete_task")
    }

    /// Reviewer rejects a deferred result: `deferred -> failed`, recording
    /// `reason`. Callers typically follow this with
    /// `mark_blocked_tasks_as_failed` to cascade the rejection.
    pub fn reject_task(&mut self, task_id: &str, reason: impl Into<String>, actor: &str) -> PatchOutcome {
        self.transition_deferred(task_id, TaskStatus::Failed, Some(reason.into()), actor, "reject_task")
    }

    /// Reviewer sends a deferred result back for rework: `deferred ->
    /// pending`, clearing `started_at`/`result` so the task re-enters the
    /// ready pool for `claim_ready_tasks`.
    pub fn requeue_task(&mut self, task_id: &str, actor: &str) -> PatchOutcome {
        let Some(task) = self.tasks.get(task_id) else {
            return PatchOutcome::Rejected { error: format!("unknown task id '{task_id}'") };
        };
        if task.status != TaskStatus::Deferred {
            return PatchOutcome::Rejected {
                error: format!("task '{task_id}' is {:?}, not deferred; cannot requeue", task.status),
            };
        }
        let patch = Patch::new(vec![Operation::UpdateTask {
            task_id: task_id.to_string(),
            patch: TaskPatch {
                status: Some(TaskStatus::Pending),
                result: Some(String::new()),
                started_at: Some(0),
                ..Default::default()
            },
        }]);
        self.apply_internal(patch, actor, "requeue_task")
    }

    fn transition_deferred(
        &mut self,
        task_id: &str,
        to: TaskStatus,
        error: Option<String>,
        actor: &str,
        reason: &str,
    ) -> PatchOutcome {
        let Some(task) = self.tasks.get(task_id) else {
            return PatchOutcome::Rejected { error: format!("unknown task id '{task_id}'") };
        };
        if task.status != TaskStatus::Deferred {
            return PatchOutcome::Rejected {
                error: format!("task '{task_id}' is {:?}, not deferred; cannot {reason}", task.status),
            };
        }
        let patch = Patch::new(vec![Operation::UpdateTask {
            task_id: task_id.to_string(),
            patch: TaskPatch { status: Some(to), error, completed_at: Some(now_ms()), ..Default::default() },
        }]);
        self.apply_internal(patch, actor, reason)
    }

    /// Reconstruct a graph from an initial task list and replay recorded
    /// patches in order. Each event's post-apply `graph_version` must match
    /// the recorded value, or replay fails with a diagnostic.
    pub fn replay(initial_tasks: Vec<Task>, events: &[MutationEvent]) -> Result<Self, GraphError> {
        let mut graph = Self::new(initial_tasks)?;
        for event in events {
            match graph.apply_patch(event.patch.clone(), event.expected_version, &event.actor, &event.reason) {
                PatchOutcome::Applied { graph_version, .. } => {
                    if graph_version != event.graph_version {
                        return Err(GraphError::ReplayMismatch {
                            event_id: event.id.clone(),
                            expected: event.graph_version,
                            actual: graph_version,
                        });
                    }
                }
                PatchOutcome::Conflict { .. } => return Err(GraphError::ReplayConflict(event.id.clone())),
                PatchOutcome::Rejected { error } => return Err(GraphError::ReplayRejected(error)),
            }
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(id: &str) -> Task {
        Task::new(id, format!("desc {id}"))
    }

    #[test]
    fn construction_rejects_empty() {
        assert_eq!(TaskGraph::new(vec![]).unwrap_err(), GraphError::Empty);
    }

    #[test]
    fn construction_rejects_self_dependency() {
        let task = t("a").with_blocked_by(["a".to_string()]);
        assert!(matches!(TaskGraph::new(vec![task]), Err(GraphError::SelfDependency(_))));
    }

    #[test]
    fn construction_rejects_unknown_dependency() {
        let task = t("a").with_blocked_by(["missing".to_string()]);
        assert!(matches!(TaskGraph::new(vec![task]), Err(GraphError::UnknownDependency { .. })));
    }

    #[test]
    fn construction_rejects_cycles() {
        let a = t("a").with_blocked_by(["b".to_string()]);
        let b = t("b").with_blocked_by(["a".to_string()]);
        assert!(matches!(TaskGraph::new(vec![a, b]), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn claim_ready_tasks_rejects_zero_limit() {
        let mut graph = TaskGraph::new(vec![t("a")]).unwrap();
        assert_eq!(graph.claim_ready_tasks(0).unwrap_err(), GraphError::InvalidClaimLimit);
    }

    #[test]
    fn claim_ready_tasks_respects_priority_and_ties() {
        let a = t("a").with_priority(1.0);
        let b = t("b").with_priority(5.0);
        let c = t("c").with_priority(5.0);
        let mut graph = TaskGraph::new(vec![a, b, c]).unwrap();
        let claimed = graph.claim_ready_tasks(2).unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].id, "b");
        assert_eq!(claimed[1].id, "c");
    }

    #[test]
    fn claim_ready_tasks_never_claims_unresolved_dependency() {
        let a = t("a");
        let b = t("b").with_blocked_by(["a".to_string()]);
        let mut graph = TaskGraph::new(vec![a, b]).unwrap();
        let claimed = graph.claim_ready_tasks(10).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, "a");
    }

    #[test]
    fn dependency_cascade_fails_transitive_chain() {
        let t1 = t("t1");
        let t2 = t("t2").with_blocked_by(["t1".to_string()]);
        let t3 = t("t3").with_blocked_by(["t2".to_string()]);
        let mut graph = TaskGraph::new(vec![t1, t2, t3]).unwrap();

        let patch = Patch::new(vec![Operation::UpdateTask {
            task_id: "t1".into(),
            patch: TaskPatch { status: Some(TaskStatus::Failed), ..Default::default() },
        }]);
        assert!(graph.apply_patch(patch, 0, "test", "fail t1").is_applied());

        let changed = graph.mark_blocked_tasks_as_failed();
        assert_eq!(changed, 2);
        assert_eq!(graph.get("t2").unwrap().status, TaskStatus::Failed);
        assert_eq!(graph.get("t3").unwrap().status, TaskStatus::Failed);
        assert!(graph.is_complete());
    }

    #[test]
    fn version_conflict_leaves_state_unchanged() {
        let mut graph = TaskGraph::new(vec![t("a")]).unwrap();
        let patch = Patch::new(vec![Operation::UpdateTask {
            task_id: "a".into(),
            patch: TaskPatch { status: Some(TaskStatus::Done), ..Default::default() },
        }]);
        assert!(graph.apply_patch(patch.clone(), 0, "test", "first").is_applied());
        assert_eq!(graph.graph_version(), 1);

        let before = graph.get("a").cloned();
        let outcome = graph.apply_patch(patch, 0, "test", "stale");
        match outcome {
            PatchOutcome::Conflict { expected, actual } => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            _ => panic!("expected conflict"),
        }
        assert_eq!(graph.graph_version(), 1);
        assert_eq!(graph.get("a").cloned().map(|t| t.status), before.map(|t| t.status));
    }

    #[test]
    fn terminal_status_cannot_be_transitioned() {
        let mut graph = TaskGraph::new(vec![t("a")]).unwrap();
        let done = Patch::new(vec![Operation::UpdateTask {
            task_id: "a".into(),
            patch: TaskPatch { status: Some(TaskStatus::Done), ..Default::default() },
        }]);
        assert!(graph.apply_patch(done, 0, "test", "done").is_applied());

        let retry = Patch::new(vec![Operation::UpdateTask {
            task_id: "a".into(),
            patch: TaskPatch { status: Some(TaskStatus::Failed), ..Default::default() },
        }]);
        let outcome = graph.apply_patch(retry, 1, "test", "illegal");
        assert!(matches!(outcome, PatchOutcome::Rejected { .. }));
        assert_eq!(graph.graph_version(), 1);
    }

    #[test]
    fn remove_task_fails_if_depended_upon() {
        let a = t("a");
        let b = t("b").with_blocked_by(["a".to_string()]);
        let mut graph = TaskGraph::new(vec![a, b]).unwrap();
        let patch = Patch::new(vec![Operation::RemoveTask { task_id: "a".into() }]);
        let outcome = graph.apply_patch(patch, 0, "test", "remove");
        assert!(matches!(outcome, PatchOutcome::Rejected { .. }));
    }

    #[test]
    fn submit_result_requires_in_progress() {
        let mut graph = TaskGraph::new(vec![t("a")]).unwrap();
        let outcome = graph.submit_result("a", "done early", "worker-1");
        assert!(matches!(outcome, PatchOutcome::Rejected { .. }));
    }

    #[test]
    fn review_lifecycle_accept_reject_requeue() {
        let mut graph = TaskGraph::new(vec![t("a"), t("b"), t("c")]).unwrap();
        graph.claim_ready_tasks(3).unwrap();

        assert!(graph.submit_result("a", "42", "worker-1").is_applied());
        assert_eq!(graph.get_awaiting_review().len(), 1);
        assert!(graph.complete_task("a", "reviewer").is_applied());
        assert_eq!(graph.get("a").unwrap().status, TaskStatus::Done);

        assert!(graph.submit_result("b", "bad output", "worker-2").is_applied());
        assert!(graph.reject_task("b", "output fails validation", "reviewer").is_applied());
        assert_eq!(graph.get("b").unwrap().status, TaskStatus::Failed);
        assert_eq!(graph.get("b").unwrap().error.as_deref(), Some("output fails validation"));

        assert!(graph.submit_result("c", "needs more work", "worker-3").is_applied());
        assert!(graph.requeue_task("c", "reviewer").is_applied());
        assert_eq!(graph.get("c").unwrap().status, TaskStatus::Pending);
        assert_eq!(graph.get_awaiting_review().len(), 0);
    }

    #[test]
    fn replay_reproduces_original_state() {
        let mut graph = TaskGraph::new(vec![t("a"), t("b")]).unwrap();
        graph
            .apply_patch(
                Patch::new(vec![Operation::UpdateTask {
                    task_id: "a".into(),
                    patch: TaskPatch { status: Some(TaskStatus::Done), ..Default::default() },
                }]),
                0,
                "test",
                "complete a",
            );
        graph.claim_ready_tasks(5).unwrap();

        let events = graph.get_events();
        let replayed = TaskGraph::replay(vec![t("a"), t("b")], &events).unwrap();

        assert_eq!(replayed.graph_version(), graph.graph_version());
        let orig: Vec<(String, TaskStatus)> = graph.tasks().iter().map(|t| (t.id.clone(), t.status)).collect();
        let replay: Vec<(String, TaskStatus)> = replayed.tasks().iter().map(|t| (t.id.clone(), t.status)).collect();
        assert_eq!(orig, replay);
    }
}
