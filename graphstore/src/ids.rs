//! Identifier generation and session-path safety
//!
//! Any user-controlled id that becomes a filesystem path segment is treated
//! as adversarial: charset and `.`/`..` are rejected before the id is ever
//! joined onto a path (see [`validate_identifier`]).

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use uuid::Uuid;

/// An identifier fails the session/checkpoint charset rule.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier must not be empty")]
    Empty,
    #[error("identifier must not be '.' or '..'")]
    ReservedName,
    #[error("identifier '{0}' contains a character outside [A-Za-z0-9._-]")]
    InvalidCharset(String),
    #[error("identifier '{0}' must start with an alphanumeric character")]
    InvalidStart(String),
}

/// Validate an identifier destined to become a path segment.
///
/// First character must be alphanumeric; subsequent characters may be
/// alphanumeric, `.`, `_`, or `-`. `.` and `..` are rejected outright.
pub fn validate_identifier(id: &str) -> Result<(), IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    if id == "." || id == ".." {
        return Err(IdError::ReservedName);
    }
    let mut chars = id.chars();
    let first = chars.next().expect("non-empty checked above");
    if !first.is_ascii_alphanumeric() {
        return Err(IdError::InvalidStart(id.to_string()));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-') {
        return Err(IdError::InvalidCharset(id.to_string()));
    }
    Ok(())
}

/// Generate a fresh, path-safe session identifier.
pub fn generate_session_id() -> String {
    format!("sess-{}", Uuid::now_v7())
}

/// Generate a deterministic, content-addressed id from a prefix and seed text.
///
/// Grounded on the teacher's `generate_id` helper: human-readable prefix plus
/// a short hash of the seed, so ids stay stable across reruns with the same
/// input (useful for idempotent task construction) while remaining path-safe.
pub fn generate_id(prefix: &str, seed: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.hash(&mut hasher);
    format!("{prefix}-{:x}", hasher.finish())
}

/// Current time in Unix milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}
