//! Tool-level error taxonomy

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("path '{path}' escapes working directory '{worktree}'")]
    SandboxViolation { path: PathBuf, worktree: PathBuf },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
