//! Agent Turn Loop (spec §4.7)
//!
//! The guarded chat/tool cycle that composes the Intent Parser, Policy
//! Engine, Beholder Overseer, and Fallback Planner around a single
//! `LlmClient`. Persists events to the `graphstore` event log and, on
//! termination, a checkpoint.

use std::path::PathBuf;
use std::sync::Arc;

use graphstore::{Checkpoint, CheckpointPhase, CheckpointStore, EventLog, HarnessEvent, HarnessEventType};
use serde_json::json;
use tracing::debug;

use crate::beholder::{Beholder, BeholderVerdict};
use crate::cancel::CancellationSignal;
use crate::fallback::FallbackPlanner;
use crate::intent::{self, IntentDeclaration, RiskLevel};
use crate::llm::{CompletionRequest, ContentBlock, LlmClient, Message, MessageContent, Role, StopReason, TokenUsage};
use crate::policy::{ApprovalHandler, PolicyDecision, PolicyEngine};
use crate::tools::{ToolContext, ToolExecutor};

const DEFAULT_MAX_TURNS: u32 = 20;

/// The intent instructional block appended to the system prompt when intent
/// declarations are required (default).
const INTENT_INSTRUCTIONS: &str = r#"Before any tool call that performs a side effect, declare your intent with a block:
<intent>{"toolName": "<tool>", "purpose": "<why>", "expectedOutcome": "<what you expect>", "riskLevel": "read|write|exec|destructive"}</intent>
Each tool call must be preceded by a matching intent declaration."#;

/// Mutable settings a pre-run hook may adjust before the first provider call.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub system_prompt: String,
    pub tool_names: Vec<String>,
}

pub type PreRunHook = Arc<dyn Fn(&mut TurnSettings, &[Message], &ToolExecutor) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    AwaitUser,
    Failed,
    Cancelled,
    MaxTurns,
    MaxTokens,
}

impl TurnStatus {
    fn checkpoint_phase(self) -> CheckpointPhase {
        match self {
            TurnStatus::Completed => CheckpointPhase::Completed,
            TurnStatus::AwaitUser => CheckpointPhase::AwaitUser,
            _ => CheckpointPhase::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub status: TurnStatus,
    pub response: String,
    pub tools_used: Vec<String>,
    pub usage: TokenUsage,
    pub phase: String,
    pub reason: Option<String>,
}

pub struct AgentConfig {
    pub llm: Arc<dyn LlmClient>,
    pub model: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub max_turns: u32,
    pub session_id: String,
    pub policy: PolicyEngine,
    pub approval_handler: Option<Arc<dyn ApprovalHandler>>,
    pub beholder: Option<Arc<Beholder>>,
    pub fallback: Option<(Arc<dyn LlmClient>, u32)>,
    pub require_intent: bool,
    pub base_dir: Option<PathBuf>,
    pub pre_run_hooks: Vec<PreRunHook>,
}

impl AgentConfig {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, policy: PolicyEngine, session_id: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            system_prompt: None,
            max_tokens: 4096,
            max_turns: DEFAULT_MAX_TURNS,
            session_id: session_id.into(),
            policy,
            approval_handler: None,
            beholder: None,
            fallback: None,
            require_intent: true,
            base_dir: None,
            pre_run_hooks: Vec::new(),
        }
    }
}

/// Runs the turn cycle for a single agent against a tool set and context.
pub struct AgentTurnLoop {
    config: AgentConfig,
    tools: ToolExecutor,
    ctx: ToolContext,
    signal: CancellationSignal,
}

impl AgentTurnLoop {
    pub fn new(config: AgentConfig, tools: ToolExecutor, ctx: ToolContext) -> Self {
        let signal = ctx.signal.clone().unwrap_or_default();
        Self { config, tools, ctx, signal }
    }

    fn event_log(&self) -> Arc<EventLog> {
        match &self.config.base_dir {
            Some(base) => EventLog::for_session(base, &self.config.session_id),
            None => EventLog::in_memory(),
        }
    }

    async fn log(&self, log: &EventLog, event_type: HarnessEventType, data: serde_json::Value) {
        log.log(HarnessEvent::new(event_type, &self.config.session_id, data)).await;
    }

    pub async fn run(&self, goal: impl Into<String>) -> TurnOutcome {
        let goal = goal.into();
        debug!(session_id = %self.config.session_id, "AgentTurnLoop::run: called");
        let log = self.event_log();

        let mut system_prompt = self.config.system_prompt.clone().unwrap_or_default();
        if self.config.require_intent {
            if !system_prompt.is_empty() {
                system_prompt.push_str("\n\n");
            }
            system_prompt.push_str(INTENT_INSTRUCTIONS);
        }

        let mut settings = TurnSettings {
            model: self.config.model.clone(),
            system_prompt,
            tool_names: self.tools.tool_names(),
        };

        let mut history = vec![Message::user(goal.clone())];
        for hook in &self.config.pre_run_hooks {
            hook(&mut settings, &history, &self.tools);
        }
        if settings.model.trim().is_empty() {
            settings.model = self.config.model.clone();
        }
        settings.tool_names.sort();
        settings.tool_names.dedup();

        let mut usage = TokenUsage::default();
        let mut tools_used: Vec<String> = Vec::new();
        let mut response_text = String::new();
        let mut tool_call_count: u32 = 0;

        let outcome_status;
        let mut outcome_reason: Option<String> = None;

        'turns: for turn in 0..self.config.max_turns {
            debug!(%turn, "AgentTurnLoop::run: turn start");
            if self.signal.is_cancelled() {
                outcome_status = TurnStatus::Cancelled;
                break 'turns;
            }

            let request = CompletionRequest {
                system_prompt: settings.system_prompt.clone(),
                messages: history.clone(),
                tools: self.tools.definitions_for(&settings.tool_names),
                max_tokens: self.config.max_tokens,
                signal: Some(self.signal.clone()),
            };

            let response = match self.config.llm.complete(request).await {
                Ok(r) => r,
                Err(err) => {
                    self.log(&log, HarnessEventType::Error, json!({"reason": "provider_error", "error": err.to_string()}))
                        .await;
                    outcome_status = TurnStatus::Failed;
                    outcome_reason = Some(err.to_string());
                    break 'turns;
                }
            };

            usage += response.usage;

            let mut assistant_blocks = Vec::new();
            if let Some(text) = &response.content {
                response_text.push_str(text);
                assistant_blocks.push(ContentBlock::text(text.clone()));
            }
            for call in &response.tool_calls {
                assistant_blocks.push(ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.input.clone(),
                });
            }
            history.push(Message::assistant_blocks(assistant_blocks));

            if response.stop_reason == StopReason::MaxTokens {
                outcome_status = TurnStatus::MaxTokens;
                break 'turns;
            }

            if response.tool_calls.is_empty() {
                outcome_status = TurnStatus::Completed;
                break 'turns;
            }

            let intents: Vec<IntentDeclaration> =
                if self.config.require_intent { intent::parse_intents(response.content.as_deref().unwrap_or("")) } else { Vec::new() };

            if self.config.require_intent {
                let validation = intent::validate_intents(&intents, &response.tool_calls);
                if !validation.is_valid() {
                    let mut blocks = Vec::new();
                    for unmatched in &validation.unmatched {
                        blocks.push(ContentBlock::tool_result(
                            unmatched.tool_call_id.clone(),
                            format!("No matching intent declared for tool '{}'; declare an <intent> block first.", unmatched.tool_name),
                            true,
                        ));
                    }
                    history.push(Message::user_blocks(blocks));
                    self.log(&log, HarnessEventType::Error, json!({"reason": "intent_gate_blocked"})).await;
                    continue 'turns;
                }
                for declaration in &intents {
                    self.log(
                        &log,
                        HarnessEventType::Intent,
                        json!({"toolName": declaration.tool_name, "purpose": declaration.purpose, "riskLevel": declaration.risk_level}),
                    )
                    .await;
                }
            }

            let mut result_blocks = Vec::new();
            let mut blocked = false;

            for call in &response.tool_calls {
                if self.signal.is_cancelled() {
                    outcome_status = TurnStatus::Cancelled;
                    break 'turns;
                }

                tool_call_count += 1;
                let risk = if self.config.require_intent {
                    intent::validate_intents(&intents, std::slice::from_ref(call))
                        .risk_for(&call.id)
                        .unwrap_or(RiskLevel::Exec)
                } else {
                    RiskLevel::Exec
                };

                let decision = self
                    .config
                    .policy
                    .decide(&call.name, risk, tool_call_count, self.config.approval_handler.as_deref())
                    .await;

                self.log(
                    &log,
                    HarnessEventType::Policy,
                    json!({"toolName": call.name, "decision": format!("{decision:?}")}),
                )
                .await;

                match decision {
                    PolicyDecision::Deny { reason } => {
                        self.log(&log, HarnessEventType::Error, json!({"reason": "policy_denied", "toolName": call.name, "detail": reason}))
                            .await;
                        outcome_status = TurnStatus::Failed;
                        outcome_reason = Some("policy_denied".to_string());
                        blocked = true;
                        break;
                    }
                    PolicyDecision::AwaitUser { .. } => {
                        outcome_status = TurnStatus::AwaitUser;
                        outcome_reason = Some("policy_await_user".to_string());
                        blocked = true;
                        break;
                    }
                    PolicyDecision::Allow { .. } => {}
                }

                if let Some(beholder) = &self.config.beholder {
                    let declared_intent = intents.iter().find(|i| i.tool_name == call.name);
                    let verdict = beholder.evaluate(declared_intent, &call.name, &call.input, response.usage.total()).await;
                    self.log(
                        &log,
                        HarnessEventType::BeholderAction,
                        json!({"toolName": call.name, "verdict": format!("{:?}", verdict.verdict), "reason": verdict.reason}),
                    )
                    .await;
                    if verdict.verdict == BeholderVerdict::Kill {
                        outcome_status = TurnStatus::Failed;
                        outcome_reason = verdict.reason;
                        blocked = true;
                        break;
                    }
                }

                self.log(&log, HarnessEventType::ToolCall, json!({"toolName": call.name, "input": call.input})).await;

                let mut result = self.tools.execute(call, &self.ctx).await;
                if !result.is_error && result.content.starts_with("Error") {
                    result.is_error = true;
                }

                if result.is_error {
                    if let Some((fallback_client, max_retries)) = &self.config.fallback {
                        self.log(&log, HarnessEventType::Fallback, json!({"toolName": call.name, "reason": result.content})).await;
                        let planner = FallbackPlanner::new(fallback_client.as_ref(), *max_retries);
                        let declared_intent = intents.iter().find(|i| i.tool_name == call.name);
                        let recovered = planner
                            .recover(declared_intent, &call.name, &call.input, &result.content, &self.tools, &self.ctx)
                            .await;
                        if recovered.resolved {
                            result.content = recovered.result.unwrap_or_default();
                            result.is_error = false;
                        }
                    }
                }

                tools_used.push(call.name.clone());
                self.log(
                    &log,
                    HarnessEventType::ToolResult,
                    json!({"toolName": call.name, "contentLength": result.content.len(), "isError": result.is_error}),
                )
                .await;

                result_blocks.push(ContentBlock::tool_result(call.id.clone(), result.content, result.is_error));
            }

            if blocked {
                break 'turns;
            }

            history.push(Message::user_blocks(result_blocks));
        } else {
            outcome_status = TurnStatus::MaxTurns;
        }

        let phase = outcome_status.checkpoint_phase();
        self.log(
            &log,
            HarnessEventType::TurnResult,
            json!({"status": format!("{outcome_status:?}"), "toolsUsed": tools_used, "usage": usage}),
        )
        .await;

        if let Some(base_dir) = &self.config.base_dir {
            let store = CheckpointStore::new(base_dir);
            let mut checkpoint = Checkpoint::new(format!("cp-{}", &self.config.session_id), goal.clone(), phase);
            checkpoint.summary = Some(response_text.clone());
            checkpoint.policy_profile = Some(format!("{:?}", self.config.policy.profile));
            if let Err(err) = store.save(&self.config.session_id, &checkpoint).await {
                debug!(%err, "AgentTurnLoop::run: checkpoint save failed, returned status unaffected");
            }
        }

        TurnOutcome {
            status: outcome_status,
            response: response_text,
            tools_used,
            usage,
            phase: format!("{phase:?}"),
            reason: outcome_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, ToolCall};
    use crate::policy::PolicyProfile;
    use tempfile::tempdir;

    fn ctx(dir: &std::path::Path) -> ToolContext {
        ToolContext::new(dir.to_path_buf(), "test-session".to_string())
    }

    #[tokio::test]
    async fn completes_when_no_tool_calls() {
        let client = Arc::new(MockLlmClient::new(vec![CompletionResponse {
            content: Some("all done".to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }]));
        let temp = tempdir().unwrap();
        let config = AgentConfig::new(client, "test-model", PolicyEngine::new(PolicyProfile::LocalPermissive), "s1");
        let turn_loop = AgentTurnLoop::new(config, ToolExecutor::standard(), ctx(temp.path()));
        let outcome = turn_loop.run("do the thing").await;
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.response, "all done");
    }

    #[tokio::test]
    async fn intent_gate_blocks_unmatched_tool_calls() {
        let client = Arc::new(MockLlmClient::new(vec![
            CompletionResponse {
                content: Some("going to read a file".to_string()),
                tool_calls: vec![ToolCall { id: "c1".into(), name: "read_file".into(), input: serde_json::json!({"path": "x"}) }],
                stop_reason: StopReason::ToolUse,
                usage: TokenUsage::default(),
            },
            CompletionResponse {
                content: Some("giving up".to_string()),
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            },
        ]));
        let temp = tempdir().unwrap();
        let config = AgentConfig::new(client, "test-model", PolicyEngine::new(PolicyProfile::LocalPermissive), "s2");
        let turn_loop = AgentTurnLoop::new(config, ToolExecutor::standard(), ctx(temp.path()));
        let outcome = turn_loop.run("read something").await;
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert!(outcome.tools_used.is_empty());
    }

    #[tokio::test]
    async fn matched_intent_allows_tool_execution() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.txt"), "contents").unwrap();
        let text = format!(
            r#"<intent>{{"toolName":"read_file","purpose":"inspect","expectedOutcome":"contents","riskLevel":"read"}}</intent>"#
        );
        let client = Arc::new(MockLlmClient::new(vec![
            CompletionResponse {
                content: Some(text),
                tool_calls: vec![ToolCall {
                    id: "c1".into(),
                    name: "read_file".into(),
                    input: serde_json::json!({"path": temp.path().join("a.txt").to_string_lossy()}),
                }],
                stop_reason: StopReason::ToolUse,
                usage: TokenUsage::default(),
            },
            CompletionResponse {
                content: Some("done".to_string()),
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            },
        ]));
        let config = AgentConfig::new(client, "test-model", PolicyEngine::new(PolicyProfile::LocalPermissive), "s3");
        let turn_loop = AgentTurnLoop::new(config, ToolExecutor::standard(), ctx(temp.path()));
        let outcome = turn_loop.run("read the file").await;
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.tools_used, vec!["read_file".to_string()]);
    }

    #[tokio::test]
    async fn cancellation_before_first_call_finalizes_cancelled() {
        let client = Arc::new(MockLlmClient::new(vec![]));
        let temp = tempdir().unwrap();
        let signal = CancellationSignal::new();
        signal.cancel();
        let mut context = ctx(temp.path());
        context = context.with_signal(signal);
        let config = AgentConfig::new(client, "test-model", PolicyEngine::new(PolicyProfile::LocalPermissive), "s4");
        let turn_loop = AgentTurnLoop::new(config, ToolExecutor::standard(), context);
        let outcome = turn_loop.run("anything").await;
        assert_eq!(outcome.status, TurnStatus::Cancelled);
    }

    #[tokio::test]
    async fn max_turns_exhausted_without_completion() {
        let responses: Vec<CompletionResponse> = (0..3)
            .map(|_| CompletionResponse {
                content: Some("working".to_string()),
                tool_calls: vec![ToolCall { id: "c".into(), name: "read_file".into(), input: serde_json::json!({"path": "x"}) }],
                stop_reason: StopReason::ToolUse,
                usage: TokenUsage::default(),
            })
            .collect();
        let client = Arc::new(MockLlmClient::new(responses));
        let temp = tempdir().unwrap();
        let mut config = AgentConfig::new(client, "test-model", PolicyEngine::new(PolicyProfile::Managed), "s5");
        config.max_turns = 3;
        config.require_intent = false;
        let turn_loop = AgentTurnLoop::new(config, ToolExecutor::read_only(), ctx(temp.path()));
        let outcome = turn_loop.run("loop forever").await;
        assert_eq!(outcome.status, TurnStatus::MaxTurns);
    }
}
