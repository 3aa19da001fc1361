//! agentd - guarded LLM agent turn loop and team coordinator
//!
//! CLI entry point: resolves configuration, builds an LLM client for the
//! requested provider slot, and dispatches to either a single Agent Turn
//! Loop run or a full Team Coordinator run.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};

use agentd::cli::{Cli, Command, OutputFormat};
use agentd::config::Config;
use agentd::llm::{create_client, LlmClient};
use agentd::policy::PolicyProfile;
use agentd::runtime_policy::{FeatureFlags, RuntimePolicy, SafetyCaps};
use agentd::tools::{ToolContext, ToolExecutor, ToolProfile};
use agentd::{
    AgentConfig, AgentTurnLoop, TeamCoordinator, TeamCoordinatorConfig, TurnStatus, WorkerFn, WorkerOutcome, WorkerTask,
};

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    let level = match cli_log_level {
        Some(s) => {
            debug!(level_str = %s, "setup_logging: level_str is Some");
            match s.to_uppercase().as_str() {
                "TRACE" => tracing::Level::TRACE,
                "DEBUG" => tracing::Level::DEBUG,
                "INFO" => tracing::Level::INFO,
                "WARN" | "WARNING" => tracing::Level::WARN,
                "ERROR" => tracing::Level::ERROR,
                _ => {
                    eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                    tracing::Level::INFO
                }
            }
        }
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn parse_tool_profile(s: &str) -> Result<ToolProfile> {
    match s {
        "privileged" => Ok(ToolProfile::Privileged),
        "standard" => Ok(ToolProfile::Standard),
        "read-only" | "readonly" => Ok(ToolProfile::ReadOnly),
        other => Err(eyre::eyre!("unknown tool profile '{other}'. Use: privileged, standard, or read-only")),
    }
}

fn parse_policy_profile(s: &str) -> Result<PolicyProfile> {
    PolicyProfile::parse(s).map_err(|e| eyre::eyre!("{e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    debug!(command = ?std::env::args().collect::<Vec<_>>(), "main: dispatching command");

    match cli.command {
        Command::Turn { goal, slot, profile, tools, working_dir, max_turns, format } => {
            cmd_turn(&config, &goal, &slot, &profile, &tools, working_dir, max_turns, format).await
        }
        Command::Team { goal, planner_slot, worker_slot, profile, tools, working_dir, verify, format } => {
            cmd_team(&config, &goal, &planner_slot, &worker_slot, &profile, &tools, working_dir, verify, format).await
        }
        Command::ShowConfig { format } => cmd_show_config(&config, format),
    }
}

/// Run a single Agent Turn Loop against a goal.
#[allow(clippy::too_many_arguments)]
async fn cmd_turn(
    config: &Config,
    goal: &str,
    slot: &str,
    profile: &str,
    tools: &str,
    working_dir: Option<PathBuf>,
    max_turns: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    debug!(%goal, %slot, %profile, %tools, "cmd_turn: called");

    let resolved = config.llm.resolve(slot).context("Failed to resolve LLM provider slot")?;
    resolved.get_api_key().context("LLM API key not found for the resolved provider slot")?;
    let llm: Arc<dyn LlmClient> = create_client(&config.llm, slot).context("Failed to create LLM client")?;

    let policy_profile = parse_policy_profile(profile)?;
    let tool_profile = parse_tool_profile(tools)?;
    let working_dir = match working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };

    let session_id = format!("turn-{}", std::process::id());
    let mut agent_config = AgentConfig::new(llm, resolved.model.clone(), agentd::PolicyEngine::new(policy_profile), session_id.clone());
    agent_config.base_dir = Some(PathBuf::from(&config.storage.data_dir));
    if let Some(max_turns) = max_turns {
        agent_config.max_turns = max_turns;
    }
    agent_config.max_tokens = resolved.max_tokens;

    let ctx = ToolContext::new(working_dir, session_id);
    let executor = ToolExecutor::with_profile(tool_profile);
    let turn_loop = AgentTurnLoop::new(agent_config, executor, ctx);

    println!("Running turn against model {}", resolved.model);
    let outcome = turn_loop.run(goal.to_string()).await;

    match format {
        OutputFormat::Json => {
            let rendered = serde_json::json!({
                "status": format!("{:?}", outcome.status),
                "response": outcome.response,
                "toolsUsed": outcome.tools_used,
                "reason": outcome.reason,
            });
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        OutputFormat::Text => {
            println!("Status: {:?}", outcome.status);
            println!("{}", outcome.response);
            if let Some(reason) = &outcome.reason {
                println!("Reason: {reason}");
            }
        }
    }

    if outcome.status != TurnStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

/// Decompose a goal into a task graph and run it across a supervised worker pool.
#[allow(clippy::too_many_arguments)]
async fn cmd_team(
    config: &Config,
    goal: &str,
    planner_slot: &str,
    worker_slot: &str,
    profile: &str,
    tools: &str,
    working_dir: Option<PathBuf>,
    verify: bool,
    format: OutputFormat,
) -> Result<()> {
    debug!(%goal, %planner_slot, %worker_slot, %profile, %tools, verify, "cmd_team: called");

    let planner_resolved = config.llm.resolve(planner_slot).context("Failed to resolve planner LLM provider slot")?;
    let worker_resolved = config.llm.resolve(worker_slot).context("Failed to resolve worker LLM provider slot")?;
    let planner_llm: Arc<dyn LlmClient> = create_client(&config.llm, planner_slot).context("Failed to create planner LLM client")?;
    let worker_llm: Arc<dyn LlmClient> = create_client(&config.llm, worker_slot).context("Failed to create worker LLM client")?;

    let policy_profile = parse_policy_profile(profile)?;
    let tool_profile = parse_tool_profile(tools)?;
    let working_dir = match working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };
    let base_dir = Some(PathBuf::from(&config.storage.data_dir));
    let run_id = format!("team-{}", std::process::id());

    let worker_model = worker_resolved.model.clone();
    let worker_max_tokens = worker_resolved.max_tokens;
    let worker: WorkerFn = {
        let run_id = run_id.clone();
        Arc::new(move |task: WorkerTask, signal: agentd::CancellationSignal| {
            let llm = worker_llm.clone();
            let model = worker_model.clone();
            let dir = working_dir.clone();
            let base = base_dir.clone();
            let run_id = run_id.clone();
            Box::pin(async move {
                let session_id = format!("{run_id}-{}", task.task_id);
                let mut agent_config =
                    AgentConfig::new(llm, model, agentd::PolicyEngine::new(policy_profile), session_id.clone());
                agent_config.base_dir = base;
                agent_config.max_tokens = worker_max_tokens;
                let ctx = ToolContext::new(dir, session_id).with_signal(signal);
                let executor = ToolExecutor::with_profile(tool_profile);
                let turn_loop = AgentTurnLoop::new(agent_config, executor, ctx);
                let outcome = turn_loop.run(task.description).await;
                match outcome.status {
                    TurnStatus::Completed => WorkerOutcome::Done(outcome.response),
                    other => WorkerOutcome::Failed(format!(
                        "worker ended with status {:?}: {}",
                        other,
                        outcome.reason.unwrap_or_default()
                    )),
                }
            })
        })
    };

    let coordinator_config = TeamCoordinatorConfig {
        planner: planner_llm,
        worker,
        worker_restart_limit: config.policy.default_call_cap.min(2),
        verify_before_complete: verify,
        verifier: None,
    };

    let caps = SafetyCaps { max_workers: config.concurrency.max_workers as usize, ..SafetyCaps::default() };
    let flags = FeatureFlags { reconcile: true, mutable_graph: true, priority_mailbox: true, ..FeatureFlags::default() };
    let policy = RuntimePolicy::new(flags, caps);

    println!("Running team coordinator (planner: {}, worker: {})", planner_resolved.model, worker_resolved.model);
    let mut coordinator = TeamCoordinator::new(coordinator_config, policy, run_id, goal.to_string());
    let result = coordinator.run(goal).await;

    match format {
        OutputFormat::Json => {
            let rendered = serde_json::json!({
                "completed": result.completed,
                "summary": result.summary,
                "error": result.error,
                "tasks": result.tasks.iter().map(|t| serde_json::json!({
                    "id": t.id,
                    "status": format!("{:?}", t.status),
                    "result": t.result,
                    "error": t.error,
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        OutputFormat::Text => {
            println!("Completed: {}", result.completed);
            for task in &result.tasks {
                println!("  - {} [{:?}]", task.id, task.status);
            }
            println!("\n{}", result.summary);
            if let Some(error) = &result.error {
                println!("Error: {error}");
            }
        }
    }

    if !result.completed {
        std::process::exit(1);
    }
    Ok(())
}

/// Print the resolved configuration.
fn cmd_show_config(config: &Config, format: OutputFormat) -> Result<()> {
    debug!("cmd_show_config: called");
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => {
            println!("LLM provider slots:");
            for (name, provider) in &config.llm.slots {
                println!("  {name}: {} / {}", provider.provider, provider.model);
            }
            println!("Concurrency: max-workers={} max-api-calls={}", config.concurrency.max_workers, config.concurrency.max_api_calls);
            println!("Policy: profile={} default-call-cap={}", config.policy.profile, config.policy.default_call_cap);
            println!("Storage: data-dir={}", config.storage.data_dir);
        }
    }
    Ok(())
}
