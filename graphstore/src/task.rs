//! Task record and status lifecycle

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{IndexValue, Record};

/// Status of a [`Task`] within a [`crate::graph::TaskGraph`].
///
/// `done` and `failed` are terminal: once reached, no further transition is
/// legal, not even to the other terminal status. `deferred` is the only
/// non-terminal status besides `pending`/`in_progress`, and `deferred ->
/// pending` is the sole re-queue path (spec §4.8, §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    Deferred,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

/// A unit of work in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub blocked_by: BTreeSet<String>,
    pub priority: f64,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl Task {
    /// Construct a new pending task. Trims and validates id/description, but
    /// uniqueness and dependency-reference checks are the graph's job.
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
            description: description.into().trim().to_string(),
            status: TaskStatus::Pending,
            blocked_by: BTreeSet::new(),
            priority: 0.0,
            assigned_to: None,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            metadata: None,
        }
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_blocked_by(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.blocked_by = ids.into_iter().collect();
        self
    }

    pub fn is_ready(&self, done_ids: &std::collections::HashSet<String>) -> bool {
        self.status == TaskStatus::Pending && self.blocked_by.iter().all(|d| done_ids.contains(d))
    }
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn indexed(&self) -> Vec<(&str, IndexValue)> {
        let status = match self.status {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Deferred => "deferred",
        };
        vec![
            ("status", IndexValue::Str(status.to_string())),
            ("priority", IndexValue::Int(self.priority as i64)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_trims_whitespace() {
        let t = Task::new("  id  ", "  desc  ");
        assert_eq!(t.id, "id");
        assert_eq!(t.description, "desc");
    }

    #[test]
    fn terminal_statuses_are_done_and_failed() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Deferred.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[test]
    fn is_ready_requires_all_deps_done() {
        let t = Task::new("t2", "d").with_blocked_by(["t1".to_string()]);
        let mut done = std::collections::HashSet::new();
        assert!(!t.is_ready(&done));
        done.insert("t1".to_string());
        assert!(t.is_ready(&done));
    }
}
