//! graphstore - versioned, replayable task graphs and session persistence
//!
//! This crate holds the data model and storage layer shared by agentd's
//! turn loop and team coordinator:
//!
//! - [`event_log`] - append-only harness event sink, scoped to a session
//! - [`checkpoint`] - versioned terminal-state snapshots on disk
//! - [`task`] - the `Task` record and its status lifecycle
//! - [`graph`] - the dependency-aware, patchable, replayable `TaskGraph`
//! - [`ids`] - session/checkpoint identifier generation and validation
//! - [`record`] - the generic indexed-record vocabulary task/session types build on

pub mod checkpoint;
pub mod event_log;
pub mod graph;
pub mod ids;
pub mod record;
pub mod task;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
pub use event_log::{EventLog, HarnessEvent, HarnessEventType};
pub use graph::{GraphError, MutationEvent, Operation, Patch, PatchOutcome, TaskGraph};
pub use ids::{generate_id, now_ms, validate_identifier};
pub use record::{Filter, FilterOp, IndexValue, Record};
pub use task::{Task, TaskStatus};
