//! Tool trait and result type (spec §3 Tool Definition)

use async_trait::async_trait;
use serde_json::Value;

use super::ToolContext;

/// Result of a single tool invocation.
///
/// A tool never throws across the boundary: failures are represented as
/// `ToolResult { is_error: true, .. }` so the Agent Turn Loop can always
/// feed a `tool_result` content block back to the model.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A tool definition: pure in the sense that no hidden state leaks across
/// calls. Identity is by `name()`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name; this is how the model refers to the tool in `tool_use`
    /// blocks and how the registry dedups on `resolve(packNames)`.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema describing the tool's expected input shape.
    fn input_schema(&self) -> Value;

    /// Execute the tool against the given input and context.
    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult;
}
