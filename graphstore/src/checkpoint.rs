//! Versioned terminal-state checkpoints
//!
//! Path convention: `<base_dir>/sessions/<session_id>/checkpoints/<checkpoint_id>.json`.
//! Grounded on `cs/src/store.rs`'s create-dir-then-write pattern for "atomic
//! enough for single-writer use" persistence, and on the teacher's
//! `thiserror`-per-component convention for `CheckpointError`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::ids::{validate_identifier, IdError};

const SCHEMA_VERSION: u32 = 1;

/// Terminal phase a checkpoint may record (spec §6: one of these three).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPhase {
    Completed,
    AwaitUser,
    Failed,
}

/// A single persisted checkpoint document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub schema_version: u32,
    pub checkpoint_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub phase: CheckpointPhase,
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_tasks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Checkpoint {
    pub fn new(checkpoint_id: impl Into<String>, goal: impl Into<String>, phase: CheckpointPhase) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            checkpoint_id: checkpoint_id.into(),
            created_at: now,
            updated_at: now,
            phase,
            goal: goal.into(),
            summary: None,
            policy_profile: None,
            pending_tasks: None,
            metadata: None,
        }
    }

    fn validate(&self) -> Result<(), CheckpointError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(CheckpointError::Validation(format!(
                "unsupported schema_version {}",
                self.schema_version
            )));
        }
        if self.checkpoint_id.trim().is_empty() {
            return Err(CheckpointError::Validation("checkpointId must not be empty".into()));
        }
        if self.goal.trim().is_empty() {
            return Err(CheckpointError::Validation("goal must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("invalid checkpoint id: {0}")]
    InvalidId(#[from] IdError),
    #[error("checkpoint validation failed: {0}")]
    Validation(String),
    #[error("checkpoint not found")]
    NotFound,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Filesystem-backed store for checkpoints, one JSON document per file.
pub struct CheckpointStore {
    base_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn path_for(&self, session_id: &str, checkpoint_id: &str) -> Result<PathBuf, CheckpointError> {
        validate_identifier(session_id)?;
        validate_identifier(checkpoint_id)?;
        Ok(self
            .base_dir
            .join("sessions")
            .join(session_id)
            .join("checkpoints")
            .join(format!("{checkpoint_id}.json")))
    }

    /// Save a checkpoint, creating parent directories as needed.
    ///
    /// "Atomic enough for single-writer use": directories are created then
    /// the file is written whole in one call, never streamed incrementally.
    pub async fn save(&self, session_id: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        checkpoint.validate()?;
        let path = self.path_for(session_id, &checkpoint.checkpoint_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(checkpoint)?;
        fs::write(&path, body).await?;
        debug!(session_id, checkpoint_id = %checkpoint.checkpoint_id, "CheckpointStore::save");
        Ok(())
    }

    /// Strict load: missing file, corrupt JSON, or failed validation all
    /// surface as an error.
    pub async fn load(&self, session_id: &str, checkpoint_id: &str) -> Result<Checkpoint, CheckpointError> {
        let path = self.path_for(session_id, checkpoint_id)?;
        let body = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CheckpointError::NotFound
            } else {
                CheckpointError::Io(e)
            }
        })?;
        let checkpoint: Checkpoint = serde_json::from_slice(&body)?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    /// Safe load: absent, corrupt, or invalid payloads all collapse to `None`
    /// rather than propagating an error.
    pub async fn load_safe(&self, session_id: &str, checkpoint_id: &str) -> Option<Checkpoint> {
        self.load(session_id, checkpoint_id).await.ok()
    }

    fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_then_load_round_trips_modulo_timestamps() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let cp = Checkpoint::new("cp-1", "ship the feature", CheckpointPhase::Completed);
        store.save("sess-1", &cp).await.unwrap();

        let loaded = store.load("sess-1", "cp-1").await.unwrap();
        assert_eq!(loaded.checkpoint_id, cp.checkpoint_id);
        assert_eq!(loaded.goal, cp.goal);
        assert_eq!(loaded.phase, cp.phase);
    }

    #[tokio::test]
    async fn load_safe_returns_none_on_missing() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load_safe("sess-1", "missing").await.is_none());
    }

    #[tokio::test]
    async fn load_strict_fails_loudly_on_missing() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let err = store.load("sess-1", "missing").await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound));
    }

    #[tokio::test]
    async fn rejects_adversarial_identifiers() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let cp = Checkpoint::new("cp-1", "goal", CheckpointPhase::Completed);
        let err = store.save("../escape", &cp).await.unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidId(_)));
    }

    #[test]
    fn path_for_is_scoped_under_base_dir() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let path = store.path_for("sess-1", "cp-1").unwrap();
        assert!(path.starts_with(store.base_dir()));
        assert!(path.ends_with("sessions/sess-1/checkpoints/cp-1.json"));
    }
}
