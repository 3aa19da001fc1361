//! CLI command definitions and subcommands

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

/// agentd - a guarded LLM agent turn loop and team coordinator
#[derive(Parser)]
#[command(name = "agentd", about = "Guarded LLM agent turn loop and team coordinator", version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true, help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a single Agent Turn Loop against a goal
    Turn {
        /// The goal/instruction given to the agent
        goal: String,

        /// Named LLM provider/model slot to use
        #[arg(long, default_value = "default")]
        slot: String,

        /// Policy profile: local-permissive, strict, managed
        #[arg(long, default_value = "strict")]
        profile: String,

        /// Tool pack: privileged, standard, read-only
        #[arg(long, default_value = "standard")]
        tools: String,

        /// Working directory the agent's tools are scoped to
        #[arg(long)]
        working_dir: Option<PathBuf>,

        /// Override the configured max turns before aborting
        #[arg(long)]
        max_turns: Option<u32>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Decompose a goal into a task graph and run it across a supervised worker pool
    Team {
        /// The goal to decompose and execute
        goal: String,

        /// Named LLM provider/model slot used for planning, verification, and synthesis
        #[arg(long, default_value = "default")]
        planner_slot: String,

        /// Named LLM provider/model slot used for worker sub-agents
        #[arg(long, default_value = "default")]
        worker_slot: String,

        /// Policy profile applied to worker sub-agents
        #[arg(long, default_value = "strict")]
        profile: String,

        /// Tool pack applied to worker sub-agents
        #[arg(long, default_value = "standard")]
        tools: String,

        /// Working directory worker sub-agents' tools are scoped to
        #[arg(long)]
        working_dir: Option<PathBuf>,

        /// Require planner approval of each worker result before marking a task done
        #[arg(long)]
        verify: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the resolved configuration (provider slots, caps, policy defaults)
    ShowConfig {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for command results
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_turn() {
        let cli = Cli::parse_from(["agentd", "turn", "fix the bug"]);
        match cli.command {
            Command::Turn { goal, slot, profile, tools, .. } => {
                assert_eq!(goal, "fix the bug");
                assert_eq!(slot, "default");
                assert_eq!(profile, "strict");
                assert_eq!(tools, "standard");
            }
            _ => panic!("expected Turn command"),
        }
    }

    #[test]
    fn test_cli_parse_team_with_verify() {
        let cli = Cli::parse_from(["agentd", "team", "ship the feature", "--verify"]);
        match cli.command {
            Command::Team { goal, verify, .. } => {
                assert_eq!(goal, "ship the feature");
                assert!(verify);
            }
            _ => panic!("expected Team command"),
        }
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["agentd", "-c", "/path/to/config.yml", "show-config"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("invalid".parse::<OutputFormat>().is_err());
    }
}
