//! Runtime Policy (spec §4.11)
//!
//! Feature flags, safety caps, the team-run phase state machine, and trust
//! gating. All distinct from the per-call Policy Engine (§4.3): this is the
//! coordinator-wide governance layer.

use thiserror::Error;
use tracing::debug;

/// All flags default off (spec §4.11).
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureFlags {
    pub reconcile: bool,
    pub mutable_graph: bool,
    pub priority_mailbox: bool,
    pub trace_replay: bool,
    pub regression_gates: bool,
    pub trust_gating: bool,
    pub hierarchy: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SafetyCaps {
    pub max_tasks: usize,
    pub max_workers: usize,
    pub max_depth: u32,
    pub max_retries: u32,
    pub max_compensating_tasks: usize,
    pub max_runtime_ms: u64,
    pub reconcile_cooldown_ms: u64,
    pub heartbeat_staleness_ms: u64,
    pub worker_timeout_ms: u64,
}

impl Default for SafetyCaps {
    fn default() -> Self {
        Self {
            max_tasks: 20,
            max_workers: 5,
            max_depth: 0,
            max_retries: 2,
            max_compensating_tasks: 3,
            max_runtime_ms: 10 * 60 * 1000,
            reconcile_cooldown_ms: 5_000,
            heartbeat_staleness_ms: 30_000,
            worker_timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Planning,
    AwaitApproval,
    Executing,
    Reconciling,
    Synthesizing,
    AwaitUser,
    Completed,
    Failed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimePolicyError {
    #[error("illegal phase transition from {from:?} to {to:?}")]
    IllegalTransition { from: Phase, to: Phase },
}

fn legal_targets(phase: Phase) -> &'static [Phase] {
    use Phase::*;
    match phase {
        Idle => &[Planning],
        Planning => &[AwaitApproval, Executing, Failed],
        Executing => &[Reconciling, Synthesizing, Failed, AwaitUser],
        Reconciling => &[Executing, Synthesizing, Failed, AwaitUser],
        Synthesizing => &[Completed, Failed],
        Completed => &[Idle],
        Failed => &[Idle],
        AwaitApproval => &[Executing, Failed, Idle],
        AwaitUser => &[Executing, Reconciling, Failed, Idle],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrustTier {
    Untrusted,
    Workspace,
    User,
    Managed,
}

/// Capability set a tool pack's risk profile maps to (spec §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
    Exec,
    Network,
    Trace,
    Hook,
    Plugin,
}

pub fn capabilities_for_profile(profile: crate::tools::ToolProfile) -> &'static [Capability] {
    use crate::tools::ToolProfile::*;
    use Capability::*;
    match profile {
        ReadOnly => &[Read, Trace],
        Standard => &[Read, Write, Trace],
        Privileged => &[Read, Write, Exec, Network, Trace],
    }
}

const UNTRUSTED_BLOCKED: [Capability; 4] = [Capability::Write, Capability::Exec, Capability::Network, Capability::Hook];

/// Coordinator-wide governance: feature flags, safety caps, and the
/// team-run phase state machine.
pub struct RuntimePolicy {
    pub flags: FeatureFlags,
    pub caps: SafetyCaps,
    phase: Phase,
}

impl RuntimePolicy {
    pub fn new(flags: FeatureFlags, caps: SafetyCaps) -> Self {
        Self { flags, caps, phase: Phase::Idle }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Transition to `target`, validating against the state machine.
    pub fn transition(&mut self, target: Phase) -> Result<(), RuntimePolicyError> {
        debug!(from = ?self.phase, to = ?target, "RuntimePolicy::transition: called");
        if !legal_targets(self.phase).contains(&target) {
            return Err(RuntimePolicyError::IllegalTransition { from: self.phase, to: target });
        }
        self.phase = target;
        Ok(())
    }

    /// When trust gating is enabled, check whether `required` trust level is
    /// satisfied by `current`, and that `current` isn't `untrusted` while
    /// requesting a blocked capability.
    pub fn check_trust(&self, current: TrustTier, required: TrustTier, capability: Capability) -> Result<(), String> {
        if !self.flags.trust_gating {
            return Ok(());
        }
        if current < required {
            return Err(format!("trust tier {current:?} does not satisfy required tier {required:?}"));
        }
        if current == TrustTier::Untrusted && UNTRUSTED_BLOCKED.contains(&capability) {
            return Err(format!("untrusted trust tier cannot use capability {capability:?}"));
        }
        Ok(())
    }
}
