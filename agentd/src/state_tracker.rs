//! Team State Tracker (spec §3 Team Run State / Worker Heartbeat, §4.9)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use graphstore::{HarnessEvent, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Restarting,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_id: String,
    pub status: WorkerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl WorkerHeartbeat {
    pub fn new(worker_id: impl Into<String>, status: WorkerStatus) -> Self {
        Self {
            worker_id: worker_id.into(),
            status,
            task_id: None,
            attempt: 0,
            detail: None,
            updated_at: Utc::now(),
        }
    }
}

/// Per-run state: phase, iteration, graph version, tasks, heartbeats, and
/// the event trail, keyed by `runId`.
pub struct TeamStateTracker {
    pub run_id: String,
    pub goal: String,
    phase: String,
    iteration: u32,
    graph_version: u64,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    last_trigger: Option<String>,
    heartbeats: HashMap<String, WorkerHeartbeat>,
    events: Vec<HarnessEvent>,
}

impl TeamStateTracker {
    pub fn new(run_id: impl Into<String>, goal: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            goal: goal.into(),
            phase: "idle".to_string(),
            iteration: 0,
            graph_version: 0,
            started_at: now,
            updated_at: now,
            completed_at: None,
            last_trigger: None,
            heartbeats: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn set_phase(&mut self, phase: impl Into<String>) {
        self.phase = phase.into();
        self.updated_at = Utc::now();
    }

    pub fn set_trigger(&mut self, trigger: impl Into<String>) {
        self.last_trigger = Some(trigger.into());
        self.updated_at = Utc::now();
    }

    pub fn advance_iteration(&mut self) {
        self.iteration += 1;
        self.updated_at = Utc::now();
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn set_graph_version(&mut self, version: u64) {
        self.graph_version = version;
    }

    pub fn graph_version(&self) -> u64 {
        self.graph_version
    }

    /// Upsert a heartbeat by `worker_id`, replacing in place.
    pub fn upsert_heartbeat(&mut self, heartbeat: WorkerHeartbeat) {
        debug!(worker_id = %heartbeat.worker_id, ?heartbeat.status, "TeamStateTracker::upsert_heartbeat: called");
        self.heartbeats.insert(heartbeat.worker_id.clone(), heartbeat);
        self.updated_at = Utc::now();
    }

    pub fn heartbeats(&self) -> Vec<&WorkerHeartbeat> {
        self.heartbeats.values().collect()
    }

    /// Heartbeats in status `busy` whose `updated_at` is older than
    /// `max_age_ms` relative to `now`.
    pub fn get_stale_heartbeats(&self, max_age_ms: i64, now: DateTime<Utc>) -> Vec<&WorkerHeartbeat> {
        self.heartbeats
            .values()
            .filter(|h| h.status == WorkerStatus::Busy && (now - h.updated_at).num_milliseconds() > max_age_ms)
            .collect()
    }

    pub fn record_event(&mut self, event: HarnessEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[HarnessEvent] {
        &self.events
    }

    /// Stamp a completion time and freeze the phase. Idempotent; a second
    /// call is a no-op once `completed_at` is set.
    pub fn finalize(&mut self, completed: bool) {
        if self.completed_at.is_some() {
            return;
        }
        self.phase = if completed { "completed".to_string() } else { "failed".to_string() };
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn is_finalized(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Snapshot tasks from a `TaskGraph` view for persistence/reporting.
    pub fn snapshot_tasks(&self, tasks: &[&Task]) -> Vec<Task> {
        tasks.iter().map(|t| (*t).clone()).collect()
    }
}
