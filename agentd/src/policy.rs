//! Policy Engine (spec §4.3)
//!
//! A pure decision function: `(toolName, riskLevel, toolCallCount)` plus an
//! optional approval handler in, a `PolicyDecision` out. Decisions never
//! mutate state outside the returned value.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::intent::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyProfile {
    LocalPermissive,
    Strict,
    Managed,
}

impl PolicyProfile {
    pub fn parse(s: &str) -> Result<Self, PolicyError> {
        match s {
            "local-permissive" => Ok(PolicyProfile::LocalPermissive),
            "strict" => Ok(PolicyProfile::Strict),
            "managed" => Ok(PolicyProfile::Managed),
            other => Err(PolicyError::UnknownProfile(other.to_string())),
        }
    }

    /// Default maximum tool-call count before every further call escalates
    /// to `await_user`.
    pub fn default_max_tool_calls(&self) -> u32 {
        match self {
            PolicyProfile::LocalPermissive => 250,
            PolicyProfile::Strict => 120,
            PolicyProfile::Managed => 80,
        }
    }
}

/// A malformed profile/cap fed in from configuration. Ambient addition
/// (SPEC_FULL §4): config loading fails loudly instead of silently
/// defaulting to some profile the operator didn't ask for.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unknown policy profile '{0}'")]
    UnknownProfile(String),

    #[error("invalid tool-call cap: {0}")]
    InvalidCap(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow { reason: Option<String> },
    AwaitUser { reason: String },
    Deny { reason: String },
}

impl PolicyDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, PolicyDecision::Allow { .. })
    }
}

/// `(ApprovalRequest) -> "approve" | "reject"`, synchronous or asynchronous.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub profile: PolicyProfile,
    pub tool_name: String,
    pub risk_level: RiskLevel,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approve,
    Reject,
}

#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn request(&self, request: ApprovalRequest) -> ApprovalOutcome;
}

/// Pure decision function plus default tool-call caps.
pub struct PolicyEngine {
    pub profile: PolicyProfile,
    pub max_tool_calls: u32,
    pub allow_list: Vec<String>,
    pub deny_list: Vec<String>,
}

impl PolicyEngine {
    pub fn new(profile: PolicyProfile) -> Self {
        let max_tool_calls = profile.default_max_tool_calls();
        Self {
            profile,
            max_tool_calls,
            allow_list: Vec::new(),
            deny_list: Vec::new(),
        }
    }

    pub fn with_max_tool_calls(mut self, max: u32) -> Self {
        self.max_tool_calls = max;
        self
    }

    pub fn with_allow_list(mut self, tools: Vec<String>) -> Self {
        self.allow_list = tools;
        self
    }

    pub fn with_deny_list(mut self, tools: Vec<String>) -> Self {
        self.deny_list = tools;
        self
    }

    /// Decide, without consulting an approval handler. See `decide` for the
    /// full contract including `await_user` escalation through a handler.
    fn decide_base(&self, tool_name: &str, risk_level: RiskLevel, tool_call_count: u32) -> PolicyDecision {
        debug!(%tool_name, ?risk_level, %tool_call_count, "PolicyEngine::decide_base: called");

        if tool_call_count > self.max_tool_calls {
            return PolicyDecision::AwaitUser {
                reason: "tool_call_cap_reached".to_string(),
            };
        }

        if self.deny_list.iter().any(|t| t == tool_name) {
            return PolicyDecision::Deny {
                reason: format!("tool '{}' is explicitly denied", tool_name),
            };
        }

        if self.allow_list.iter().any(|t| t == tool_name) {
            return PolicyDecision::Allow { reason: None };
        }

        use RiskLevel::*;
        match (self.profile, risk_level) {
            (PolicyProfile::LocalPermissive, Destructive) => PolicyDecision::AwaitUser {
                reason: format!("destructive tool '{}' requires approval under local-permissive", tool_name),
            },
            (PolicyProfile::LocalPermissive, _) => PolicyDecision::Allow { reason: None },

            (PolicyProfile::Strict, Read) => PolicyDecision::Allow { reason: None },
            (PolicyProfile::Strict, _) => PolicyDecision::AwaitUser {
                reason: format!("tool '{}' ({:?}) requires approval under strict", tool_name, risk_level),
            },

            (PolicyProfile::Managed, Read) => PolicyDecision::Allow { reason: None },
            (PolicyProfile::Managed, Write) => PolicyDecision::AwaitUser {
                reason: format!("write tool '{}' requires approval under managed", tool_name),
            },
            (PolicyProfile::Managed, Exec | Destructive) => PolicyDecision::Deny {
                reason: format!("tool '{}' ({:?}) is denied under managed", tool_name, risk_level),
            },
        }
    }

    /// Full decision, escalating through an approval handler when one is
    /// supplied and the base decision is `await_user`.
    pub async fn decide(
        &self,
        tool_name: &str,
        risk_level: RiskLevel,
        tool_call_count: u32,
        approval_handler: Option<&(dyn ApprovalHandler)>,
    ) -> PolicyDecision {
        let decision = self.decide_base(tool_name, risk_level, tool_call_count);

        let PolicyDecision::AwaitUser { reason } = &decision else {
            return decision;
        };

        let Some(handler) = approval_handler else {
            return decision;
        };

        let outcome = handler
            .request(ApprovalRequest {
                profile: self.profile,
                tool_name: tool_name.to_string(),
                risk_level,
                reason: reason.clone(),
            })
            .await;

        match outcome {
            ApprovalOutcome::Approve => PolicyDecision::Allow {
                reason: Some(format!("approved_by_handler:{} ({:?})", tool_name, risk_level)),
            },
            ApprovalOutcome::Reject => PolicyDecision::Deny {
                reason: format!("approval_rejected:{} ({:?})", tool_name, risk_level),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysApprove;
    #[async_trait]
    impl ApprovalHandler for AlwaysApprove {
        async fn request(&self, _request: ApprovalRequest) -> ApprovalOutcome {
            ApprovalOutcome::Approve
        }
    }

    struct AlwaysReject;
    #[async_trait]
    impl ApprovalHandler for AlwaysReject {
        async fn request(&self, _request: ApprovalRequest) -> ApprovalOutcome {
            ApprovalOutcome::Reject
        }
    }

    #[tokio::test]
    async fn local_permissive_allows_write_denies_nothing_but_awaits_destructive() {
        let engine = PolicyEngine::new(PolicyProfile::LocalPermissive);
        assert!(engine.decide("write_file", RiskLevel::Write, 1, None).await.is_allow());
        assert!(matches!(
            engine.decide("rm_rf", RiskLevel::Destructive, 1, None).await,
            PolicyDecision::AwaitUser { .. }
        ));
    }

    #[tokio::test]
    async fn strict_only_allows_read() {
        let engine = PolicyEngine::new(PolicyProfile::Strict);
        assert!(engine.decide("read_file", RiskLevel::Read, 1, None).await.is_allow());
        assert!(matches!(
            engine.decide("write_file", RiskLevel::Write, 1, None).await,
            PolicyDecision::AwaitUser { .. }
        ));
    }

    #[tokio::test]
    async fn managed_denies_exec_and_destructive() {
        let engine = PolicyEngine::new(PolicyProfile::Managed);
        assert!(matches!(
            engine.decide("bash", RiskLevel::Exec, 1, None).await,
            PolicyDecision::Deny { .. }
        ));
    }

    #[tokio::test]
    async fn tool_call_cap_escalates_regardless_of_profile() {
        let engine = PolicyEngine::new(PolicyProfile::LocalPermissive).with_max_tool_calls(5);
        let decision = engine.decide("read_file", RiskLevel::Read, 6, None).await;
        assert!(matches!(decision, PolicyDecision::AwaitUser { reason } if reason == "tool_call_cap_reached"));
    }

    #[tokio::test]
    async fn approval_handler_upgrades_await_user_to_allow() {
        let engine = PolicyEngine::new(PolicyProfile::Strict);
        let decision = engine
            .decide("write_file", RiskLevel::Write, 1, Some(&AlwaysApprove))
            .await;
        assert!(decision.is_allow());
    }

    #[tokio::test]
    async fn approval_handler_downgrades_await_user_to_deny() {
        let engine = PolicyEngine::new(PolicyProfile::Strict);
        let decision = engine
            .decide("write_file", RiskLevel::Write, 1, Some(&AlwaysReject))
            .await;
        assert!(matches!(decision, PolicyDecision::Deny { .. }));
    }

    #[tokio::test]
    async fn deny_list_wins_over_profile() {
        let engine = PolicyEngine::new(PolicyProfile::LocalPermissive).with_deny_list(vec!["bash".to_string()]);
        assert!(matches!(
            engine.decide("bash", RiskLevel::Read, 1, None).await,
            PolicyDecision::Deny { .. }
        ));
    }

    #[tokio::test]
    async fn allow_list_wins_over_profile() {
        let engine = PolicyEngine::new(PolicyProfile::Managed).with_allow_list(vec!["bash".to_string()]);
        assert!(engine.decide("bash", RiskLevel::Exec, 1, None).await.is_allow());
    }

    #[test]
    fn unknown_profile_string_errors() {
        assert!(PolicyProfile::parse("yolo").is_err());
    }
}
