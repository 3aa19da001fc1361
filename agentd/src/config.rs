//! agentd configuration: loading, provider table, and resolution
//!
//! `Config::load` mirrors the fallback chain used across this codebase
//! (explicit path -> project-local file -> user config dir -> defaults).
//! `LlmConfig` holds the raw, possibly-multi-provider table a user writes
//! in their config file; `.resolve(slot)` turns a named slot ("default",
//! "cheap", ...) into a fully-formed [`ResolvedLlmConfig`] that the LLM
//! client constructors consume directly.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{eyre, Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level agentd configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Named LLM provider/model slots, e.g. "default" and "cheap".
    pub llm: LlmConfig,

    /// Concurrency limits for the team coordinator's worker pool.
    pub concurrency: ConcurrencyConfig,

    /// Policy engine defaults.
    pub policy: PolicyConfig,

    /// Storage configuration for the event log / checkpoint store.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration with fallback chain.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".agentd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("agentd").join("agentd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// One named provider/model slot (spec §6 LLM Provider contract inputs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmProviderConfig {
    /// Provider name: "anthropic" or "openai".
    pub provider: String,

    /// Model identifier.
    pub model: String,

    /// Environment variable containing the API key.
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL.
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response.
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds.
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 8192,
            timeout_ms: 300_000,
        }
    }
}

/// The raw LLM section of a config file: a table of named slots.
///
/// The Beholder Overseer's drift classifier and the Fallback Planner both
/// resolve a separate "cheap" slot rather than hardcoding a second client
/// type; a config that omits "cheap" falls back to "default" so both
/// features work out of the box with a single provider entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(flatten)]
    pub slots: HashMap<String, LlmProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut slots = HashMap::new();
        slots.insert("default".to_string(), LlmProviderConfig::default());
        Self { slots }
    }
}

impl LlmConfig {
    /// Resolve a named slot into a fully-formed provider configuration.
    ///
    /// Unknown slot names fall back to "default"; a missing "default" is
    /// an error since every agent run needs at least one provider.
    pub fn resolve(&self, slot: &str) -> Result<ResolvedLlmConfig> {
        let raw = self
            .slots
            .get(slot)
            .or_else(|| self.slots.get("default"))
            .ok_or_else(|| eyre!("no LLM provider configured (missing slot '{slot}' and no 'default')"))?;

        Ok(ResolvedLlmConfig {
            provider: raw.provider.clone(),
            model: raw.model.clone(),
            api_key_env: raw.api_key_env.clone(),
            base_url: raw.base_url.clone(),
            max_tokens: raw.max_tokens,
            timeout_ms: raw.timeout_ms,
        })
    }
}

/// A fully resolved, ready-to-use provider configuration.
#[derive(Debug, Clone)]
pub struct ResolvedLlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl ResolvedLlmConfig {
    /// Read the API key from the environment variable this slot names.
    pub fn get_api_key(&self) -> Result<String> {
        env::var(&self.api_key_env)
            .with_context(|| format!("environment variable {} is not set", self.api_key_env))
    }
}

/// Concurrency limits for the team coordinator's worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum concurrent worker agents.
    #[serde(rename = "max-workers")]
    pub max_workers: u32,

    /// Maximum concurrent provider requests across all agents.
    #[serde(rename = "max-api-calls")]
    pub max_api_calls: u32,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            max_api_calls: 4,
        }
    }
}

/// Default policy profile and tool-call caps, fed into the Policy Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Default policy profile name: "local-permissive", "supervised", "locked-down".
    pub profile: String,

    /// Default per-tool call cap before an otherwise-allowed call escalates
    /// to `await_user`.
    #[serde(rename = "default-call-cap")]
    pub default_call_cap: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            profile: "supervised".to_string(),
            default_call_cap: 20,
        }
    }
}

/// Storage configuration for the event log / checkpoint store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for checkpoint and event log files.
    #[serde(rename = "data-dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: ".agentd".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.concurrency.max_workers, 8);
        assert_eq!(config.policy.profile, "supervised");
    }

    #[test]
    fn test_default_llm_resolves() {
        let config = LlmConfig::default();
        let resolved = config.resolve("default").unwrap();
        assert_eq!(resolved.provider, "anthropic");
        assert_eq!(resolved.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_unknown_slot_falls_back_to_default() {
        let config = LlmConfig::default();
        let resolved = config.resolve("cheap").unwrap();
        assert_eq!(resolved.model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_missing_default_errors() {
        let config = LlmConfig { slots: HashMap::new() };
        assert!(config.resolve("default").is_err());
    }

    #[test]
    fn test_deserialize_multi_provider_config() {
        let yaml = r#"
llm:
  default:
    provider: anthropic
    model: claude-opus-4
    api-key-env: MY_API_KEY
    base-url: https://api.example.com
    max-tokens: 8192
    timeout-ms: 60000
  cheap:
    provider: openai
    model: gpt-4o-mini
    api-key-env: OPENAI_API_KEY
    base-url: https://api.openai.com
    max-tokens: 2048
    timeout-ms: 30000

concurrency:
  max-workers: 4
  max-api-calls: 2
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let default = config.llm.resolve("default").unwrap();
        assert_eq!(default.model, "claude-opus-4");
        let cheap = config.llm.resolve("cheap").unwrap();
        assert_eq!(cheap.provider, "openai");
        assert_eq!(config.concurrency.max_workers, 4);
    }

    #[test]
    fn test_get_api_key_missing_env_errors() {
        let resolved = ResolvedLlmConfig {
            provider: "anthropic".into(),
            model: "m".into(),
            api_key_env: "AGENTD_TEST_DEFINITELY_UNSET_KEY".into(),
            base_url: "https://api.anthropic.com".into(),
            max_tokens: 100,
            timeout_ms: 1000,
        };
        assert!(resolved.get_api_key().is_err());
    }
}
