//! Fallback Planner (spec §4.6)
//!
//! On a failed tool call, asks a cheap LLM for a single JSON suggestion
//! `{toolName|null, input}` and retries with the suggestion, up to
//! `max_retries` times.

use serde_json::Value;
use tracing::debug;

use crate::intent::IntentDeclaration;
use crate::llm::{CompletionRequest, LlmClient, Message, ToolCall};
use crate::tools::{ToolContext, ToolExecutor};

#[derive(Debug, Clone)]
struct Attempt {
    tool_name: Option<String>,
    input: Option<Value>,
    error: String,
}

#[derive(Debug, Clone)]
pub struct FallbackResult {
    pub resolved: bool,
    pub result: Option<String>,
    pub attempts: usize,
    pub summary: String,
}

pub struct FallbackPlanner<'a> {
    client: &'a dyn LlmClient,
    max_retries: u32,
}

impl<'a> FallbackPlanner<'a> {
    pub fn new(client: &'a dyn LlmClient, max_retries: u32) -> Self {
        Self { client, max_retries }
    }

    /// Attempt to recover from a failed tool call. `intent`, `failed_tool`,
    /// and `failed_input` describe the call that just errored with
    /// `failure_reason`.
    pub async fn recover(
        &self,
        intent: Option<&IntentDeclaration>,
        failed_tool: &str,
        failed_input: &Value,
        failure_reason: &str,
        executor: &ToolExecutor,
        ctx: &ToolContext,
    ) -> FallbackResult {
        debug!(%failed_tool, %failure_reason, "FallbackPlanner::recover: called");
        let mut attempts: Vec<Attempt> = vec![Attempt {
            tool_name: Some(failed_tool.to_string()),
            input: Some(failed_input.clone()),
            error: failure_reason.to_string(),
        }];

        for round in 0..self.max_retries {
            debug!(%round, "FallbackPlanner::recover: asking for a suggestion");
            let suggestion = match self.suggest(intent, failed_tool, &attempts, executor).await {
                Some(s) => s,
                None => {
                    return FallbackResult {
                        resolved: false,
                        result: None,
                        attempts: attempts.len(),
                        summary: "fallback planner returned no suggestion".to_string(),
                    }
                }
            };

            let Some(tool_name) = suggestion.get("toolName").and_then(Value::as_str) else {
                return FallbackResult {
                    resolved: false,
                    result: None,
                    attempts: attempts.len(),
                    summary: "fallback planner suggested stopping".to_string(),
                };
            };
            let input = suggestion.get("input").cloned().unwrap_or(Value::Null);

            if !executor.has_tool(tool_name) {
                attempts.push(Attempt {
                    tool_name: Some(tool_name.to_string()),
                    input: Some(input),
                    error: format!("unknown tool '{tool_name}'"),
                });
                continue;
            }

            let call = ToolCall { id: format!("fallback-{round}"), name: tool_name.to_string(), input: input.clone() };
            let result = executor.execute(&call, ctx).await;
            if result.is_error {
                attempts.push(Attempt {
                    tool_name: Some(tool_name.to_string()),
                    input: Some(input),
                    error: result.content,
                });
                continue;
            }

            return FallbackResult {
                resolved: true,
                result: Some(result.content),
                attempts: attempts.len(),
                summary: format!("recovered via '{tool_name}' after {} attempt(s)", attempts.len()),
            };
        }

        FallbackResult {
            resolved: false,
            result: None,
            attempts: attempts.len(),
            summary: format!("exhausted {} retries without recovering", self.max_retries),
        }
    }

    async fn suggest(
        &self,
        intent: Option<&IntentDeclaration>,
        failed_tool: &str,
        attempts: &[Attempt],
        executor: &ToolExecutor,
    ) -> Option<Value> {
        let intent_desc = intent
            .map(|i| format!("purpose: {}, expected outcome: {}", i.purpose, i.expected_outcome))
            .unwrap_or_else(|| "no declared intent".to_string());

        let history: String = attempts
            .iter()
            .enumerate()
            .map(|(i, a)| format!("attempt {}: tool={:?} input={:?} error={}", i, a.tool_name, a.input, a.error))
            .collect::<Vec<_>>()
            .join("\n");

        let available: String = executor.tool_names().join(", ");

        let prompt = format!(
            "A tool call to '{failed_tool}' failed. Intent: {intent_desc}\n\nPrior attempts:\n{history}\n\n\
             Available tools: {available}\n\n\
             Suggest a single alternative tool call as JSON: {{\"toolName\": string|null, \"input\": object}}. \
             Use null to give up."
        );

        let request = CompletionRequest {
            system_prompt: "You are a fallback planner recovering a failed tool call.".to_string(),
            messages: vec![Message::user(prompt)],
            tools: vec![],
            max_tokens: 512,
            signal: None,
        };

        let response = self.client.complete(request).await.ok()?;
        let text = response.content?;
        serde_json::from_str(&text).ok()
    }
}
