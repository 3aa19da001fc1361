//! Append-only harness event log
//!
//! Two sinks: an in-memory buffer (always) plus, when file-backed, a
//! `events.jsonl` file under the session directory. Grounded on the
//! teacher's `EventBus`/`EventEmitter` (`tokio::sync::broadcast` fan-out)
//! for the live-subscriber half, and on `cs/src/store.rs`'s
//! create-dir-then-write pattern for the durable half.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

/// The vocabulary of harness event kinds (spec §3 Harness Event).
///
/// Consumers must tolerate unknown types without failing, so deserialization
/// falls back to [`HarnessEventType::Other`] for any tag this binary doesn't
/// recognize yet (forward compatibility across versions of the event log).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarnessEventType {
    Intent,
    ToolCall,
    ToolResult,
    Policy,
    BeholderAction,
    Fallback,
    TurnResult,
    Error,
    #[serde(other)]
    Other,
}

/// A single recorded harness event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: HarnessEventType,
    pub agent_id: String,
    pub data: Value,
}

impl HarnessEvent {
    pub fn new(event_type: HarnessEventType, agent_id: impl Into<String>, data: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            agent_id: agent_id.into(),
            data,
        }
    }
}

const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Append-only, chronologically ordered harness event sink.
///
/// `log` appends to the in-memory buffer unconditionally and, if file-backed,
/// appends one `<json>\n` line under the same lock (spec §5: the in-memory
/// append and the file append happen under the same lock when file-backed,
/// so the two views never diverge in order).
pub struct EventLog {
    inner: Mutex<Inner>,
    tx: broadcast::Sender<HarnessEvent>,
}

struct Inner {
    buffer: Vec<HarnessEvent>,
    file: Option<PathBuf>,
}

impl EventLog {
    /// Create an in-memory-only event log (no durable file sink).
    pub fn in_memory() -> Arc<Self> {
        let (tx, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Arc::new(Self {
            inner: Mutex::new(Inner { buffer: Vec::new(), file: None }),
            tx,
        })
    }

    /// Create an event log backed by `<base_dir>/sessions/<session_id>/events.jsonl`.
    ///
    /// The parent directory is created on demand at first write, not here.
    pub fn for_session(base_dir: &Path, session_id: &str) -> Arc<Self> {
        let path = base_dir.join("sessions").join(session_id).join("events.jsonl");
        let (tx, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Arc::new(Self {
            inner: Mutex::new(Inner { buffer: Vec::new(), file: Some(path) }),
            tx,
        })
    }

    /// Append an event to memory and, if file-backed, to disk.
    pub async fn log(&self, event: HarnessEvent) {
        debug!(event_type = ?event.event_type, agent_id = %event.agent_id, "EventLog::log");
        let mut inner = self.inner.lock().await;
        if let Some(path) = inner.file.clone() {
            if let Err(err) = Self::append_line(&path, &event).await {
                debug!(%err, "EventLog::log: failed to persist event to file");
            }
        }
        inner.buffer.push(event.clone());
        drop(inner);
        let _ = self.tx.send(event);
    }

    async fn append_line(path: &Path, event: &HarnessEvent) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(event).expect("HarnessEvent serialization is infallible");
        line.push('\n');
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(line.as_bytes()).await
    }

    /// Snapshot of all events logged so far, in order.
    pub async fn get_events(&self) -> Vec<HarnessEvent> {
        self.inner.lock().await.buffer.clone()
    }

    /// Subscribe to live events as they are logged.
    pub fn subscribe(&self) -> broadcast::Receiver<HarnessEvent> {
        self.tx.subscribe()
    }
}
