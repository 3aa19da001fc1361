//! ToolExecutor - executes resolved tool calls against a `ToolContext`

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::llm::{ToolCall, ToolDefinition};

use super::builtin::{GlobTool, GrepTool, ListDirectoryTool, ReadFileTool, ReadOnlyBashTool, RunCommandTool, SpawnAgentTool, WriteFileTool};
use super::{Tool, ToolContext, ToolResult};

/// Named default tool packs (spec §4.11 capability-set mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolProfile {
    /// `{read, write, exec, network, trace}` - full access.
    #[default]
    Privileged,
    /// `{read, write, trace}` - no shell execution.
    Standard,
    /// `{read, trace}` - no writes, no shell execution.
    ReadOnly,
}

/// Executes a fixed set of resolved tools against a `ToolContext`.
pub struct ToolExecutor {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolExecutor {
    pub fn with_profile(profile: ToolProfile) -> Self {
        debug!(?profile, "ToolExecutor::with_profile: called");
        let mut executor = Self::empty();

        executor.add_tool(Arc::new(ReadFileTool));
        executor.add_tool(Arc::new(ListDirectoryTool));
        executor.add_tool(Arc::new(GlobTool));
        executor.add_tool(Arc::new(GrepTool));

        match profile {
            ToolProfile::Privileged => {
                executor.add_tool(Arc::new(WriteFileTool));
                executor.add_tool(Arc::new(RunCommandTool));
            }
            ToolProfile::Standard => {
                executor.add_tool(Arc::new(WriteFileTool));
                executor.add_tool(Arc::new(ReadOnlyBashTool));
            }
            ToolProfile::ReadOnly => {
                executor.add_tool(Arc::new(ReadOnlyBashTool));
            }
        }

        executor
    }

    pub fn standard() -> Self {
        Self::with_profile(ToolProfile::Standard)
    }

    pub fn read_only() -> Self {
        Self::with_profile(ToolProfile::ReadOnly)
    }

    pub fn empty() -> Self {
        debug!("ToolExecutor::empty: called");
        Self { tools: HashMap::new() }
    }

    /// Build from an already-resolved tool list (e.g. `ToolRegistry::resolve`).
    pub fn from_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut executor = Self::empty();
        for tool in tools {
            executor.add_tool(tool);
        }
        executor
    }

    pub fn with_spawn(mut self) -> Self {
        self.add_tool(Arc::new(SpawnAgentTool));
        self
    }

    pub fn add_tool(&mut self, tool: Arc<dyn Tool>) {
        debug!(tool_name = %tool.name(), "ToolExecutor::add_tool: called");
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        debug!("ToolExecutor::definitions: called");
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn definitions_for(&self, tool_names: &[String]) -> Vec<ToolDefinition> {
        debug!(?tool_names, "ToolExecutor::definitions_for: called");
        tool_names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub async fn execute(&self, tool_call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        debug!(tool_name = %tool_call.name, tool_id = %tool_call.id, "ToolExecutor::execute: called");
        match self.tools.get(&tool_call.name) {
            Some(tool) => tool.execute(tool_call.input.clone(), ctx).await,
            None => {
                debug!("ToolExecutor::execute: unknown tool");
                ToolResult::error(format!("Unknown tool: {}", tool_call.name))
            }
        }
    }

    pub async fn execute_all(&self, tool_calls: &[ToolCall], ctx: &ToolContext) -> Vec<(String, ToolResult)> {
        debug!(count = %tool_calls.len(), "ToolExecutor::execute_all: called");
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            let result = self.execute(call, ctx).await;
            results.push((call.id.clone(), result));
        }
        results
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::standard()
    }
}
