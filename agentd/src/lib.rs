//! agentd - provider-agnostic LLM agent turn loop and team coordinator
//!
//! agentd drives a language model through a chat-plus-tool-calls cycle
//! under safety controls (the Agent Turn Loop), and decomposes a goal into
//! a dependency graph of tasks executed across a supervised worker pool
//! (the Team Coordinator). State and history persist through the
//! `graphstore` crate's Event Log, Checkpoint Store, and Task Graph.
//!
//! # Modules
//!
//! - [`llm`] - provider-agnostic chat/tool data model and Anthropic/OpenAI clients
//! - [`cancel`] - first-class cancellation signal, propagated to children
//! - [`tools`] - tool trait, registry, and builtin tool pack
//! - [`config`] - configuration types and loading
//! - [`intent`] - intent declaration parsing and tool-call validation
//! - [`policy`] - policy engine decision function
//! - [`beholder`] - rolling-window watchdog over a running turn loop
//! - [`fallback`] - bounded-retry recovery planner for failed tool calls
//! - [`agent`] - the guarded chat/tool turn cycle
//! - [`mailbox`] - typed, TTL-aware priority message queue
//! - [`state_tracker`] - per-run phase/task/heartbeat state
//! - [`reconcile`] - event-triggered policy/heartbeat reconciliation
//! - [`runtime_policy`] - feature flags, safety caps, phase state machine, trust gating
//! - [`coordinator`] - team coordinator: planner, worker pool, synthesis
//! - [`spawner`] - `spawn_agent` wiring: registry, depth limits, child turn loops
//! - [`scoring`] - baseline response keyword-coverage scoring
//! - [`cli`] - command-line interface

#![allow(dead_code)]

pub mod agent;
pub mod beholder;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod fallback;
pub mod intent;
pub mod llm;
pub mod mailbox;
pub mod policy;
pub mod reconcile;
pub mod runtime_policy;
pub mod scoring;
pub mod spawner;
pub mod state_tracker;
pub mod tools;

pub use agent::{AgentConfig, AgentTurnLoop, TurnOutcome, TurnStatus};
pub use beholder::{Beholder, BeholderConfig, BeholderOutcome, BeholderVerdict};
pub use cancel::CancellationSignal;
pub use config::{Config, LlmConfig, ResolvedLlmConfig};
pub use coordinator::{
    RegressionReport, TeamCoordinator, TeamCoordinatorConfig, TeamRunResult, WorkerFn, WorkerOutcome, WorkerTask,
};
pub use fallback::{FallbackPlanner, FallbackResult};
pub use intent::{parse_intents, validate_intents, IntentDeclaration, IntentValidation, RiskLevel, UnmatchedCall};
pub use llm::{
    create_client, create_client_from_resolved, AnthropicClient, CompletionRequest, CompletionResponse, LlmClient,
    LlmError, OpenAIClient,
};
pub use mailbox::{Mailbox, MessagePriority, MessageType, PriorityMessage};
pub use policy::{ApprovalHandler, ApprovalOutcome, ApprovalRequest, PolicyDecision, PolicyEngine, PolicyError, PolicyProfile};
pub use reconcile::{ReconcileAction, ReconcileDecision, ReconcileLoop, ReconcileTrigger};
pub use runtime_policy::{FeatureFlags, Phase, RuntimePolicy, SafetyCaps, TrustTier};
pub use scoring::{score_baseline_responses, BaselineTask};
pub use spawner::{AgentTypeDef, TurnLoopSpawner};
pub use state_tracker::{TeamStateTracker, WorkerHeartbeat, WorkerStatus};
pub use tools::{Tool, ToolContext, ToolError, ToolRegistry, ToolResult};
