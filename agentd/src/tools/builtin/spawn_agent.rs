//! spawn_agent tool (spec §4.13) - spawn a child agent and return its response

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{SpawnAgentRequest, Tool, ToolContext, ToolResult};

/// Spawn a child agent of a given type with a prompt; returns the child's
/// final response text. Depth and policy gating live in the
/// `AgentSpawner` implementation injected via `ToolContext::agent_spawner`
/// - this tool is just the boundary the model sees.
pub struct SpawnAgentTool;

#[async_trait]
impl Tool for SpawnAgentTool {
    fn name(&self) -> &'static str {
        "spawn_agent"
    }

    fn description(&self) -> &'static str {
        "Spawn a child agent of a registered type to work on a sub-task. Returns the child's final response."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "agentType": {
                    "type": "string",
                    "description": "Registered child agent type"
                },
                "prompt": {
                    "type": "string",
                    "description": "Task prompt for the child agent"
                },
                "context": {
                    "type": "string",
                    "description": "Optional extra context concatenated to the prompt"
                }
            },
            "required": ["agentType", "prompt"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "SpawnAgentTool::execute: called");
        let agent_type = match input["agentType"].as_str() {
            Some(t) => t.to_string(),
            None => return ToolResult::error("agentType is required"),
        };

        let prompt = match input["prompt"].as_str() {
            Some(p) => p.to_string(),
            None => return ToolResult::error("prompt is required"),
        };

        let context = input["context"].as_str().map(str::to_string);

        let Some(spawner) = &ctx.agent_spawner else {
            debug!("SpawnAgentTool::execute: no spawner configured in this context");
            return ToolResult::error("spawn_agent is unavailable in this context");
        };

        let request = SpawnAgentRequest {
            agent_type,
            prompt,
            context,
            current_depth: ctx.spawn_depth,
        };

        match spawner.spawn(request).await {
            Ok(response) => ToolResult::success(response),
            Err(e) => ToolResult::error(format!("spawn_agent failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct EchoSpawner;

    #[async_trait]
    impl crate::tools::AgentSpawner for EchoSpawner {
        async fn spawn(&self, request: SpawnAgentRequest) -> eyre::Result<String> {
            Ok(format!("{}:{}", request.agent_type, request.prompt))
        }
    }

    #[tokio::test]
    async fn test_spawn_agent_without_spawner_errors() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        let tool = SpawnAgentTool;

        let result = tool
            .execute(serde_json::json!({"agentType": "reviewer", "prompt": "look at this"}), &ctx)
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_spawn_agent_with_spawner_succeeds() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string())
            .with_agent_spawner(Arc::new(EchoSpawner) as _, 1);
        let tool = SpawnAgentTool;

        let result = tool
            .execute(serde_json::json!({"agentType": "reviewer", "prompt": "look at this"}), &ctx)
            .await;

        assert!(!result.is_error);
        assert_eq!(result.content, "reviewer:look at this");
        let _ = PathBuf::new();
    }

    #[tokio::test]
    async fn test_spawn_agent_missing_prompt() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        let tool = SpawnAgentTool;

        let result = tool.execute(serde_json::json!({"agentType": "reviewer"}), &ctx).await;
        assert!(result.is_error);
        assert!(result.content.contains("prompt is required"));
    }
}
