//! Tool system for the Agent Turn Loop
//!
//! Tools provide file system access, command execution, and agent spawning
//! capabilities. Each agent run gets a `ToolContext` scoped to its working
//! directory.

mod context;
mod error;
mod executor;
mod registry;
mod traits;

pub mod builtin;

pub use context::{AgentSpawner, AgentSpawnerRef, SpawnAgentRequest, ToolContext};
pub use error::ToolError;
pub use executor::{ToolExecutor, ToolProfile};
pub use registry::ToolRegistry;
pub use traits::{Tool, ToolResult};
