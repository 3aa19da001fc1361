//! LLM Client module for TaskDaemon
//!
//! Provides LLM completion requests and utilities.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod openai;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
#[allow(unused_imports)]
pub use types::Role;
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent, StopReason, StreamChunk, TokenUsage,
    ToolCall, ToolDefinition,
};

use crate::config::{LlmConfig, ResolvedLlmConfig};

/// Create an LLM client for a named provider/model slot.
///
/// Resolves `slot` (falling back to "default" per [`LlmConfig::resolve`]) and
/// creates the appropriate client. Supports "anthropic" and "openai" providers.
pub fn create_client(config: &LlmConfig, slot: &str) -> Result<Arc<dyn LlmClient>, LlmError> {
    let resolved = config.resolve(slot).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

    create_client_from_resolved(&resolved)
}

/// Create an LLM client from a resolved configuration
///
/// This is useful when you've already resolved the config or want to use
/// a specific provider/model combination.
pub fn create_client_from_resolved(config: &ResolvedLlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client_from_resolved: called");
    match config.provider.as_str() {
        "anthropic" => {
            debug!("create_client_from_resolved: creating Anthropic client");
            Ok(Arc::new(AnthropicClient::from_config(config)?))
        }
        "openai" => {
            debug!("create_client_from_resolved: creating OpenAI client");
            Ok(Arc::new(OpenAIClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client_from_resolved: unknown provider");
            Err(LlmError::InvalidResponse(format!(
                "Unknown LLM provider: '{}'. Supported: anthropic, openai",
                other
            )))
        }
    }
}

