//! Spawn-Agent wiring (spec §4.13)
//!
//! Implements [`AgentSpawner`] on top of [`AgentTurnLoop`]: registry lookup,
//! depth check, stricter-of-parent-and-type policy resolution, tool-pack
//! resolution (excluding `spawn`, re-added for types that spawn further),
//! and child construction/execution.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::agent::{AgentConfig, AgentTurnLoop, TurnStatus};
use crate::cancel::CancellationSignal;
use crate::llm::LlmClient;
use crate::policy::PolicyEngine;
use crate::tools::{AgentSpawner, AgentSpawnerRef, SpawnAgentRequest, ToolContext, ToolExecutor, ToolProfile};
use crate::PolicyProfile;

fn profile_rank(profile: PolicyProfile) -> u8 {
    match profile {
        PolicyProfile::LocalPermissive => 0,
        PolicyProfile::Strict => 1,
        PolicyProfile::Managed => 2,
    }
}

/// The stricter of two profiles, ranked `local-permissive < strict < managed`.
fn stricter(a: PolicyProfile, b: PolicyProfile) -> PolicyProfile {
    if profile_rank(b) > profile_rank(a) {
        b
    } else {
        a
    }
}

/// A registered child agent type (spec §4.13 step 1).
#[derive(Clone)]
pub struct AgentTypeDef {
    pub name: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub policy_profile: PolicyProfile,
    pub tool_profile: ToolProfile,
    /// Whether this type's own tool pack includes `spawn` (can spawn grandchildren).
    pub can_spawn: bool,
    /// `type.isolation.maxDepth`, defaulting to 1 when unset.
    pub max_depth: u32,
}

impl AgentTypeDef {
    pub fn new(name: impl Into<String>, model: impl Into<String>, policy_profile: PolicyProfile, tool_profile: ToolProfile) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            system_prompt: None,
            policy_profile,
            tool_profile,
            can_spawn: false,
            max_depth: 1,
        }
    }
}

/// `AgentSpawner` backed by real `AgentTurnLoop` children. Cloning produces a
/// spawner scoped to a specific node in the spawn tree - a child's own
/// `policy_profile`/`session_id`/`signal` become its "parent" context when it
/// spawns grandchildren.
#[derive(Clone)]
pub struct TurnLoopSpawner {
    llm: Arc<dyn LlmClient>,
    registry: Arc<HashMap<String, AgentTypeDef>>,
    working_dir: PathBuf,
    base_dir: Option<PathBuf>,
    policy_profile: PolicyProfile,
    session_id: String,
    signal: CancellationSignal,
    global_max_depth: u32,
}

impl TurnLoopSpawner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: HashMap<String, AgentTypeDef>,
        working_dir: PathBuf,
        policy_profile: PolicyProfile,
        session_id: impl Into<String>,
        signal: CancellationSignal,
        global_max_depth: u32,
    ) -> Self {
        Self {
            llm,
            registry: Arc::new(registry),
            working_dir,
            base_dir: None,
            policy_profile,
            session_id: session_id.into(),
            signal,
            global_max_depth,
        }
    }

    pub fn with_base_dir(mut self, base_dir: PathBuf) -> Self {
        self.base_dir = Some(base_dir);
        self
    }
}

#[async_trait]
impl AgentSpawner for TurnLoopSpawner {
    async fn spawn(&self, request: SpawnAgentRequest) -> eyre::Result<String> {
        debug!(agent_type = %request.agent_type, depth = request.current_depth, "TurnLoopSpawner::spawn: called");

        let def = self
            .registry
            .get(&request.agent_type)
            .ok_or_else(|| eyre::eyre!("unknown agent type '{}'", request.agent_type))?;

        let allowed_depth = self.global_max_depth.min(def.max_depth);
        if request.current_depth >= allowed_depth {
            return Err(eyre::eyre!(
                "spawn depth {} reached the limit of {} for agent type '{}'",
                request.current_depth,
                allowed_depth,
                request.agent_type
            ));
        }

        let effective_profile = stricter(self.policy_profile, def.policy_profile);
        let child_depth = request.current_depth + 1;
        let child_session_id = format!("{}-{}-{}", self.session_id, request.agent_type, child_depth);
        let child_signal = self.signal.child();

        let mut tools = ToolExecutor::with_profile(def.tool_profile);
        let mut ctx = ToolContext::new(self.working_dir.clone(), child_session_id.clone()).with_signal(child_signal.clone());

        if def.can_spawn {
            tools = tools.with_spawn();
            let mut grandchild_spawner = self.clone();
            grandchild_spawner.policy_profile = effective_profile;
            grandchild_spawner.session_id = child_session_id.clone();
            grandchild_spawner.signal = child_signal.clone();
            ctx = ctx.with_agent_spawner(Arc::new(grandchild_spawner) as AgentSpawnerRef, child_depth);
        }

        let prompt = match &request.context {
            Some(extra) => format!("{}\n\n{extra}", request.prompt),
            None => request.prompt.clone(),
        };

        let mut config = AgentConfig::new(self.llm.clone(), def.model.clone(), PolicyEngine::new(effective_profile), child_session_id);
        config.system_prompt = def.system_prompt.clone();
        config.base_dir = self.base_dir.clone();

        let turn_loop = AgentTurnLoop::new(config, tools, ctx);
        let outcome = turn_loop.run(prompt).await;

        match outcome.status {
            TurnStatus::Completed => Ok(outcome.response),
            other => Err(eyre::eyre!(
                "child agent '{}' ended with status {:?}: {}",
                request.agent_type,
                other,
                outcome.reason.unwrap_or_default()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage};

    fn response(text: &str) -> CompletionResponse {
        CompletionResponse { content: Some(text.to_string()), tool_calls: vec![], stop_reason: StopReason::EndTurn, usage: TokenUsage::default() }
    }

    fn registry() -> HashMap<String, AgentTypeDef> {
        let mut reg = HashMap::new();
        reg.insert(
            "reviewer".to_string(),
            AgentTypeDef::new("reviewer", "test-model", PolicyProfile::Strict, ToolProfile::ReadOnly),
        );
        reg
    }

    #[tokio::test]
    async fn unknown_agent_type_errors() {
        let llm = Arc::new(MockLlmClient::new(vec![]));
        let spawner = TurnLoopSpawner::new(
            llm,
            registry(),
            std::env::temp_dir(),
            PolicyProfile::LocalPermissive,
            "parent",
            CancellationSignal::new(),
            5,
        );
        let result = spawner
            .spawn(SpawnAgentRequest { agent_type: "ghost".to_string(), prompt: "hi".to_string(), context: None, current_depth: 0 })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn depth_limit_is_enforced() {
        let llm = Arc::new(MockLlmClient::new(vec![]));
        let spawner = TurnLoopSpawner::new(
            llm,
            registry(),
            std::env::temp_dir(),
            PolicyProfile::LocalPermissive,
            "parent",
            CancellationSignal::new(),
            5,
        );
        let result = spawner
            .spawn(SpawnAgentRequest { agent_type: "reviewer".to_string(), prompt: "hi".to_string(), context: None, current_depth: 1 })
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("depth"));
    }

    #[tokio::test]
    async fn successful_spawn_returns_child_response() {
        let llm = Arc::new(MockLlmClient::new(vec![response("looks good")]));
        let spawner = TurnLoopSpawner::new(
            llm,
            registry(),
            std::env::temp_dir(),
            PolicyProfile::LocalPermissive,
            "parent",
            CancellationSignal::new(),
            5,
        );
        let result = spawner
            .spawn(SpawnAgentRequest { agent_type: "reviewer".to_string(), prompt: "review this".to_string(), context: None, current_depth: 0 })
            .await
            .unwrap();
        assert_eq!(result, "looks good");
    }
}
