//! LlmClient trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;
#[allow(unused_imports)]
use tracing::debug;

use super::{CompletionRequest, CompletionResponse, LlmError, StreamChunk};

/// Stateless LLM client - each call carries its own full history
///
/// A client holds no conversation state between calls; the caller (the
/// agent turn loop, the drift classifier, the fallback planner, the team
/// planner) is responsible for assembling `request.messages` fresh each
/// time. This keeps provider adapters interchangeable and trivially
/// testable against a [`mock::MockLlmClient`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request and wait for the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Streaming completion; sends chunks to the provided channel as they
    /// arrive and returns the final accumulated response.
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError>;
}
