//! ToolContext - execution context for tools

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::cancel::CancellationSignal;

use super::ToolError;

/// Inputs to the Spawn-Agent tool (spec §4.13).
#[derive(Debug, Clone)]
pub struct SpawnAgentRequest {
    pub agent_type: String,
    pub prompt: String,
    pub context: Option<String>,
    pub current_depth: u32,
}

/// Dependency-injected entry point the `spawn_agent` builtin tool calls
/// into; keeps `ToolContext` decoupled from the Agent Turn Loop so tools
/// don't depend on the module that depends on them.
#[async_trait::async_trait]
pub trait AgentSpawner: Send + Sync {
    async fn spawn(&self, request: SpawnAgentRequest) -> eyre::Result<String>;
}

pub type AgentSpawnerRef = Arc<dyn AgentSpawner>;

/// Execution context for tools - scoped to a single agent turn loop run.
///
/// Tools here are illustrative default implementations behind the `Tool`
/// trait, not a hardened sandbox (spec.md §1 Non-goals excludes concrete
/// shell sandboxing); `validate_path` still constrains file tools to the
/// working directory as a baseline safety net.
#[derive(Clone)]
pub struct ToolContext {
    /// Working directory file tools are scoped to.
    pub working_dir: PathBuf,

    /// Session id, used for log correlation and derived child session ids.
    pub session_id: String,

    /// Whether path sandboxing is enforced (default: true).
    pub sandbox_enabled: bool,

    /// Cancellation signal forwarded from the Agent Turn Loop.
    pub signal: Option<CancellationSignal>,

    /// Depth-aware callback for the `spawn_agent` builtin tool. `None`
    /// means spawning is unavailable in this context (e.g. inside a child
    /// agent whose tool pack excludes `spawn`).
    pub agent_spawner: Option<AgentSpawnerRef>,

    /// Current spawn depth, incremented for each nested `spawn_agent` call.
    pub spawn_depth: u32,
}

impl ToolContext {
    pub fn new(working_dir: PathBuf, session_id: String) -> Self {
        debug!(?working_dir, %session_id, "ToolContext::new: called");
        Self {
            working_dir,
            session_id,
            sandbox_enabled: true,
            signal: None,
            agent_spawner: None,
            spawn_depth: 0,
        }
    }

    pub fn new_unsandboxed(working_dir: PathBuf, session_id: String) -> Self {
        debug!(?working_dir, %session_id, "ToolContext::new_unsandboxed: called");
        Self {
            sandbox_enabled: false,
            ..Self::new(working_dir, session_id)
        }
    }

    pub fn with_signal(mut self, signal: CancellationSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_agent_spawner(mut self, spawner: AgentSpawnerRef, depth: u32) -> Self {
        self.agent_spawner = Some(spawner);
        self.spawn_depth = depth;
        self
    }

    fn normalize_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Validate path is within the working directory.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        debug!(?path, "ToolContext::validate_path: called");
        let normalized = self.normalize_path(path);

        if !self.sandbox_enabled {
            return Ok(normalized);
        }

        let canonical = if normalized.exists() {
            normalized.canonicalize().unwrap_or_else(|_| normalized.clone())
        } else if let Some(parent) = normalized.parent() {
            if parent.exists() {
                let canonical_parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
                canonical_parent.join(normalized.file_name().unwrap_or_default())
            } else {
                normalized.clone()
            }
        } else {
            normalized.clone()
        };

        let working_dir_canonical = self.working_dir.canonicalize().unwrap_or_else(|_| self.working_dir.clone());

        if canonical.starts_with(&working_dir_canonical) {
            Ok(canonical)
        } else {
            debug!("ToolContext::validate_path: sandbox violation detected");
            Err(ToolError::SandboxViolation {
                path: path.to_path_buf(),
                worktree: self.working_dir.clone(),
            })
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("working_dir", &self.working_dir)
            .field("session_id", &self.session_id)
            .field("sandbox_enabled", &self.sandbox_enabled)
            .field("spawn_depth", &self.spawn_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_validate_path_within_working_dir() {
        let temp = tempdir().unwrap();
        let working_dir = temp.path().to_path_buf();
        let file_path = working_dir.join("test.txt");
        fs::write(&file_path, "content").unwrap();

        let ctx = ToolContext::new(working_dir, "test-session".to_string());
        let result = ctx.validate_path(Path::new("test.txt"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_path_outside_working_dir() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-session".to_string());

        let result = ctx.validate_path(Path::new("/etc/passwd"));
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ToolError::SandboxViolation { .. }));
    }

    #[test]
    fn test_validate_path_with_sandbox_disabled() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new_unsandboxed(temp.path().to_path_buf(), "test-session".to_string());

        let result = ctx.validate_path(Path::new("/etc/passwd"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_new_file_path() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-session".to_string());

        let result = ctx.validate_path(Path::new("new_file.txt"));
        assert!(result.is_ok());
    }
}
