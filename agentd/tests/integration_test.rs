//! End-to-end scenarios for the Agent Turn Loop and Team Coordinator.
//!
//! Each test below is one of the literal scenarios worked through the real
//! public API (mocked only at the LLM provider boundary).

use std::sync::Arc;
use std::time::Duration;

use agentd::llm::client::mock::MockLlmClient;
use agentd::llm::{CompletionResponse, StopReason, TokenUsage, ToolCall};
use agentd::{
    AgentConfig, AgentTurnLoop, Beholder, BeholderConfig, PolicyEngine, PolicyProfile, TeamCoordinator,
    TeamCoordinatorConfig, TurnStatus, WorkerFn, WorkerOutcome, WorkerTask,
};
use agentd::runtime_policy::{FeatureFlags, RuntimePolicy, SafetyCaps};
use agentd::tools::{ToolContext, ToolExecutor};

fn response(text: &str, calls: Vec<ToolCall>) -> CompletionResponse {
    let stop_reason = if calls.is_empty() { StopReason::EndTurn } else { StopReason::ToolUse };
    CompletionResponse { content: Some(text.to_string()), tool_calls: calls, stop_reason, usage: TokenUsage::default() }
}

/// Scenario 1: single tool call in local-permissive.
#[tokio::test]
async fn single_tool_call_in_local_permissive_completes() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("a"), "hello").unwrap();

    let intent = r#"<intent>{"toolName":"read_file","purpose":"read cfg","expectedOutcome":"contents","riskLevel":"read"}</intent>"#;
    let client = Arc::new(MockLlmClient::new(vec![
        response(
            intent,
            vec![ToolCall { id: "t1".into(), name: "read_file".into(), input: serde_json::json!({"path": temp.path().join("a").to_string_lossy()}) }],
        ),
        response("done", vec![]),
    ]));

    let config = AgentConfig::new(client, "test-model", PolicyEngine::new(PolicyProfile::LocalPermissive), "scenario-1");
    let ctx = ToolContext::new(temp.path().to_path_buf(), "scenario-1".to_string());
    let turn_loop = AgentTurnLoop::new(config, ToolExecutor::standard(), ctx);

    let outcome = turn_loop.run("read the file").await;
    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.tools_used, vec!["read_file".to_string()]);
    assert_eq!(outcome.response, "done");
}

/// Scenario 2: policy await_user in strict, no approval handler.
#[tokio::test]
async fn write_tool_under_strict_profile_awaits_user() {
    let temp = tempfile::tempdir().unwrap();
    let intent = r#"<intent>{"toolName":"write_file","purpose":"save notes","expectedOutcome":"file written","riskLevel":"write"}</intent>"#;
    let client = Arc::new(MockLlmClient::new(vec![response(
        intent,
        vec![ToolCall {
            id: "t1".into(),
            name: "write_file".into(),
            input: serde_json::json!({"path": "notes.txt", "content": "hi"}),
        }],
    )]));

    let config = AgentConfig::new(client, "test-model", PolicyEngine::new(PolicyProfile::Strict), "scenario-2");
    let ctx = ToolContext::new(temp.path().to_path_buf(), "scenario-2".to_string());
    let turn_loop = AgentTurnLoop::new(config, ToolExecutor::standard(), ctx);

    let outcome = turn_loop.run("write some notes").await;
    assert_eq!(outcome.status, TurnStatus::AwaitUser);
    assert!(outcome.tools_used.is_empty());
    assert!(!temp.path().join("notes.txt").exists());
}

/// Scenario 3: three identical calls in a row trigger Beholder kill.
#[tokio::test]
async fn three_identical_calls_trigger_loop_detection_kill() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("a"), "hello").unwrap();
    let path = temp.path().join("a").to_string_lossy().to_string();
    let call = || ToolCall { id: "t".into(), name: "read_file".into(), input: serde_json::json!({"path": path}) };
    let intent = r#"<intent>{"toolName":"read_file","purpose":"poll","expectedOutcome":"contents","riskLevel":"read"}</intent>"#;

    let responses = (0..4).map(|_| response(intent, vec![call()])).collect();
    let client = Arc::new(MockLlmClient::new(responses));

    let mut config = AgentConfig::new(client, "test-model", PolicyEngine::new(PolicyProfile::LocalPermissive), "scenario-3");
    config.max_turns = 10;
    config.beholder = Some(Arc::new(Beholder::new(BeholderConfig::default())));
    let ctx = ToolContext::new(temp.path().to_path_buf(), "scenario-3".to_string());
    let turn_loop = AgentTurnLoop::new(config, ToolExecutor::standard(), ctx);

    let outcome = turn_loop.run("poll the file").await;
    assert_eq!(outcome.status, TurnStatus::Failed);
    assert_eq!(outcome.tools_used.len(), 2, "the third identical call should be killed before executing");
}

/// Scenario 6: worker timeout and restart.
#[tokio::test]
async fn worker_timeout_restarts_once_then_fails() {
    let planner = Arc::new(MockLlmClient::new(vec![
        response(r#"[{"id": "t1", "description": "do the slow thing"}]"#, vec![]),
        response("partial completion: t1 never finished", vec![]),
    ]));

    let hanging_worker: WorkerFn = Arc::new(|_task, signal| {
        Box::pin(async move {
            signal.cancelled().await;
            WorkerOutcome::Failed("cancelled after hang".to_string())
        })
    });

    let config = TeamCoordinatorConfig {
        planner,
        worker: hanging_worker,
        worker_restart_limit: 1,
        verify_before_complete: false,
        verifier: None,
    };
    let caps = SafetyCaps { worker_timeout_ms: 50, max_runtime_ms: 10_000, ..SafetyCaps::default() };
    let policy = RuntimePolicy::new(FeatureFlags::default(), caps);
    let mut coordinator = TeamCoordinator::new(config, policy, "scenario-6", "slow goal");

    let started = std::time::Instant::now();
    let result = coordinator.run("slow goal").await;
    let elapsed = started.elapsed();

    assert!(!result.completed);
    assert_eq!(result.tasks.len(), 1);
    assert!(result.tasks[0].error.as_deref().unwrap_or("").contains("timed out"));
    // One restart means the worker is attempted twice, each bounded by worker_timeout_ms.
    assert!(elapsed >= Duration::from_millis(80), "expected roughly two timeout windows, got {elapsed:?}");
}
