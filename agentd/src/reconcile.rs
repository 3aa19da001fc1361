//! Reconcile Loop (spec §4.10)
//!
//! Event-triggered handler that inspects pending task count, context
//! requests, and stale heartbeats, and emits orchestrator-facing mailbox
//! messages plus a list of actions. Purely advisory: it never mutates the
//! task graph itself.

use tracing::debug;

use crate::mailbox::{Mailbox, MessagePriority, MessageType, PriorityMessage};
use crate::state_tracker::WorkerHeartbeat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileTrigger {
    InitialPlan,
    BatchClaimed,
    TaskResolved,
    DependencyFailure,
    WorkerRestarted,
    WorkerFailed,
    WorkerCompleted,
    HeartbeatStale,
    RunCompleted,
    RunFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    Noop,
    PolicyViolation,
    EscalateUser,
    RequestContext { from: String },
}

#[derive(Debug, Clone)]
pub struct ReconcileInput<'a> {
    pub trigger: ReconcileTrigger,
    pub pending_task_count: usize,
    pub needs_context: &'a [String],
    pub stale_heartbeats: &'a [WorkerHeartbeat],
}

#[derive(Debug, Clone)]
pub struct ReconcileDecision {
    pub actions: Vec<ReconcileAction>,
}

pub struct ReconcileLoop {
    pub enabled: bool,
    pub max_tasks: usize,
    pub orchestrator_id: String,
}

impl ReconcileLoop {
    pub fn new(enabled: bool, max_tasks: usize, orchestrator_id: impl Into<String>) -> Self {
        Self { enabled, max_tasks, orchestrator_id: orchestrator_id.into() }
    }

    /// Run one reconciliation pass. Returns `noop` without side effects when
    /// the reconcile feature flag is off.
    pub fn reconcile(&self, input: ReconcileInput<'_>, mailbox: &Mailbox) -> ReconcileDecision {
        debug!(?input.trigger, "ReconcileLoop::reconcile: called");
        if !self.enabled {
            return ReconcileDecision { actions: vec![ReconcileAction::Noop] };
        }

        let mut actions = Vec::new();

        if input.pending_task_count > self.max_tasks {
            mailbox.send(PriorityMessage::new(
                format!("reconcile-cap-{}", uuid::Uuid::now_v7()),
                "reconcile",
                &self.orchestrator_id,
                format!("pending task count {} exceeds cap {}", input.pending_task_count, self.max_tasks),
                MessageType::Alert,
                MessagePriority::Critical,
            ));
            actions.push(ReconcileAction::PolicyViolation);
            actions.push(ReconcileAction::EscalateUser);
        }

        for requester in input.needs_context {
            mailbox.send(PriorityMessage::new(
                format!("reconcile-ctx-{}", uuid::Uuid::now_v7()),
                requester,
                &self.orchestrator_id,
                format!("worker '{requester}' needs additional context"),
                MessageType::NeedsContext,
                MessagePriority::High,
            ));
            actions.push(ReconcileAction::RequestContext { from: requester.clone() });
        }

        for heartbeat in input.stale_heartbeats {
            mailbox.send(PriorityMessage::new(
                format!("reconcile-hb-{}", uuid::Uuid::now_v7()),
                &heartbeat.worker_id,
                &self.orchestrator_id,
                format!("worker '{}' heartbeat is stale", heartbeat.worker_id),
                MessageType::Heartbeat,
                MessagePriority::Critical,
            ));
            actions.push(ReconcileAction::EscalateUser);
        }

        if actions.is_empty() {
            actions.push(ReconcileAction::Noop);
        }

        ReconcileDecision { actions }
    }
}
