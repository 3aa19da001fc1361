//! Beholder Overseer (spec §4.5)
//!
//! An advisory watchdog over a running turn loop: rolling rate limiter,
//! identical-call loop detector, token-budget enforcer, and an optional
//! LLM-assisted drift classifier. It never halts execution itself - the
//! Turn Loop decides what to do with `pause`/`warn`/`kill`.

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::intent::IntentDeclaration;
use crate::llm::{CompletionRequest, LlmClient, Message};

const WINDOW_SECS: i64 = 60;
const LOOP_DETECTION_RUN: usize = 3;
const RECENT_INTENTS_CAP: usize = 10;
const DRIFT_CHECK_EVERY: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeholderVerdict {
    Ok,
    Warn,
    Pause,
    Kill,
}

#[derive(Debug, Clone)]
pub struct BeholderOutcome {
    pub verdict: BeholderVerdict,
    pub reason: Option<String>,
}

impl BeholderOutcome {
    fn ok() -> Self {
        Self { verdict: BeholderVerdict::Ok, reason: None }
    }

    fn warn(reason: impl Into<String>) -> Self {
        Self { verdict: BeholderVerdict::Warn, reason: Some(reason.into()) }
    }

    fn pause(reason: impl Into<String>) -> Self {
        Self { verdict: BeholderVerdict::Pause, reason: Some(reason.into()) }
    }

    fn kill(reason: impl Into<String>) -> Self {
        Self { verdict: BeholderVerdict::Kill, reason: Some(reason.into()) }
    }
}

#[derive(Debug, Clone)]
struct CallRecord {
    timestamp: DateTime<Utc>,
    tool_name: String,
    input_hash: String,
}

pub struct BeholderConfig {
    pub token_budget: u64,
    pub per_minute_cap: usize,
    pub drift_warn_threshold: u32,
    pub drift_model: Option<String>,
}

impl Default for BeholderConfig {
    fn default() -> Self {
        Self {
            token_budget: 200_000,
            per_minute_cap: 120,
            drift_warn_threshold: 3,
            drift_model: None,
        }
    }
}

struct State {
    records: VecDeque<CallRecord>,
    cumulative_tokens: u64,
    evaluation_count: u64,
    drift_counter: u32,
    recent_intents: VecDeque<String>,
}

/// Rolling-window watchdog attached to a single agent turn loop run.
pub struct Beholder {
    config: BeholderConfig,
    drift_client: Option<Box<dyn LlmClient>>,
    state: Mutex<State>,
}

impl Beholder {
    pub fn new(config: BeholderConfig) -> Self {
        Self {
            config,
            drift_client: None,
            state: Mutex::new(State {
                records: VecDeque::new(),
                cumulative_tokens: 0,
                evaluation_count: 0,
                drift_counter: 0,
                recent_intents: VecDeque::new(),
            }),
        }
    }

    pub fn with_drift_client(mut self, client: Box<dyn LlmClient>) -> Self {
        self.drift_client = Some(client);
        self
    }

    fn hash_input(input: &Value) -> String {
        let mut hasher = DefaultHasher::new();
        input.to_string().hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }

    /// Evaluate one `(intent, tool_call)` pair, accumulating `tokens_used`
    /// from this step's usage.
    pub async fn evaluate(
        &self,
        intent: Option<&IntentDeclaration>,
        tool_name: &str,
        input: &Value,
        tokens_used: u64,
    ) -> BeholderOutcome {
        debug!(%tool_name, %tokens_used, "Beholder::evaluate: called");
        let now = Utc::now();
        let input_hash = Self::hash_input(input);

        let should_drift_check = {
            let mut state = self.state.lock().expect("beholder state mutex poisoned");

            state.cumulative_tokens += tokens_used;
            if state.cumulative_tokens > self.config.token_budget {
                return BeholderOutcome::kill("Token budget exceeded");
            }

            while let Some(front) = state.records.front() {
                if (now - front.timestamp).num_seconds() > WINDOW_SECS {
                    state.records.pop_front();
                } else {
                    break;
                }
            }
            state.records.push_back(CallRecord {
                timestamp: now,
                tool_name: tool_name.to_string(),
                input_hash: input_hash.clone(),
            });

            if state.records.len() > self.config.per_minute_cap {
                return BeholderOutcome::pause("Rate limit");
            }

            if state.records.len() >= LOOP_DETECTION_RUN {
                let tail: Vec<&CallRecord> = state.records.iter().rev().take(LOOP_DETECTION_RUN).collect();
                if tail.windows(2).all(|w| w[0].tool_name == w[1].tool_name && w[0].input_hash == w[1].input_hash) {
                    return BeholderOutcome::kill("Loop detected");
                }
            }

            if let Some(intent) = intent {
                if state.recent_intents.len() == RECENT_INTENTS_CAP {
                    state.recent_intents.pop_front();
                }
                state.recent_intents.push_back(intent.purpose.clone());
            }

            state.evaluation_count += 1;
            state.evaluation_count % DRIFT_CHECK_EVERY == 0 && self.drift_client.is_some()
        };

        if should_drift_check {
            if let Some(outcome) = self.run_drift_check().await {
                return outcome;
            }
        }

        BeholderOutcome::ok()
    }

    async fn run_drift_check(&self) -> Option<BeholderOutcome> {
        let Some(client) = &self.drift_client else { return None };
        let intents_snapshot: Vec<String> = {
            let state = self.state.lock().expect("beholder state mutex poisoned");
            state.recent_intents.iter().cloned().collect()
        };
        if intents_snapshot.is_empty() {
            return None;
        }

        let prompt = format!(
            "Recent stated intents for an autonomous agent:\n{}\n\nDoes this sequence still serve a coherent goal? Reply with JSON {{\"aligned\": true|false}}.",
            intents_snapshot.join("\n")
        );

        let request = CompletionRequest {
            system_prompt: "You are a drift classifier for an autonomous coding agent.".to_string(),
            messages: vec![Message::user(prompt)],
            tools: vec![],
            max_tokens: 256,
            signal: None,
        };

        let response = match client.complete(request).await {
            Ok(r) => r,
            Err(err) => {
                debug!(%err, "Beholder::run_drift_check: drift check failed, treating as non-fatal");
                return None;
            }
        };

        let aligned = response
            .content
            .as_deref()
            .and_then(|text| serde_json::from_str::<Value>(text).ok())
            .and_then(|v| v.get("aligned").and_then(Value::as_bool));

        match aligned {
            Some(true) => {
                let mut state = self.state.lock().expect("beholder state mutex poisoned");
                state.drift_counter = 0;
                None
            }
            Some(false) => {
                let mut state = self.state.lock().expect("beholder state mutex poisoned");
                state.drift_counter += 1;
                if state.drift_counter >= self.config.drift_warn_threshold {
                    Some(BeholderOutcome::kill("Drift threshold exceeded"))
                } else {
                    Some(BeholderOutcome::warn("Possible drift detected"))
                }
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage};

    #[tokio::test]
    async fn token_budget_kills() {
        let beholder = Beholder::new(BeholderConfig { token_budget: 100, ..Default::default() });
        let outcome = beholder.evaluate(None, "read_file", &serde_json::json!({}), 200).await;
        assert_eq!(outcome.verdict, BeholderVerdict::Kill);
        assert_eq!(outcome.reason.as_deref(), Some("Token budget exceeded"));
    }

    #[tokio::test]
    async fn rate_limit_pauses() {
        let beholder = Beholder::new(BeholderConfig { per_minute_cap: 2, ..Default::default() });
        assert_eq!(beholder.evaluate(None, "a", &serde_json::json!({}), 0).await.verdict, BeholderVerdict::Ok);
        assert_eq!(beholder.evaluate(None, "b", &serde_json::json!({}), 0).await.verdict, BeholderVerdict::Ok);
        let outcome = beholder.evaluate(None, "c", &serde_json::json!({}), 0).await;
        assert_eq!(outcome.verdict, BeholderVerdict::Pause);
    }

    #[tokio::test]
    async fn identical_repeated_calls_trigger_loop_detection() {
        let beholder = Beholder::new(BeholderConfig::default());
        let input = serde_json::json!({"path": "x"});
        beholder.evaluate(None, "read_file", &input, 0).await;
        beholder.evaluate(None, "read_file", &input, 0).await;
        let outcome = beholder.evaluate(None, "read_file", &input, 0).await;
        assert_eq!(outcome.verdict, BeholderVerdict::Kill);
        assert_eq!(outcome.reason.as_deref(), Some("Loop detected"));
    }

    #[tokio::test]
    async fn varying_calls_do_not_trigger_loop_detection() {
        let beholder = Beholder::new(BeholderConfig::default());
        beholder.evaluate(None, "read_file", &serde_json::json!({"path": "a"}), 0).await;
        beholder.evaluate(None, "read_file", &serde_json::json!({"path": "b"}), 0).await;
        let outcome = beholder.evaluate(None, "read_file", &serde_json::json!({"path": "c"}), 0).await;
        assert_eq!(outcome.verdict, BeholderVerdict::Ok);
    }

    #[tokio::test]
    async fn drift_classifier_misalignment_warns_then_kills() {
        let responses = vec![
            CompletionResponse {
                content: Some(r#"{"aligned": false}"#.to_string()),
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            },
            CompletionResponse {
                content: Some(r#"{"aligned": false}"#.to_string()),
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            },
            CompletionResponse {
                content: Some(r#"{"aligned": false}"#.to_string()),
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            },
        ];
        let beholder = Beholder::new(BeholderConfig { drift_warn_threshold: 2, ..Default::default() })
            .with_drift_client(Box::new(MockLlmClient::new(responses)));

        let intent = IntentDeclaration {
            tool_name: "read_file".to_string(),
            purpose: "inspect config".to_string(),
            expected_outcome: "contents".to_string(),
            risk_level: crate::intent::RiskLevel::Read,
            timestamp: Utc::now(),
        };

        let mut last = BeholderOutcome::ok();
        for i in 0..5u32 {
            last = beholder
                .evaluate(Some(&intent), &format!("tool{i}"), &serde_json::json!({"i": i}), 0)
                .await;
        }
        assert_eq!(last.verdict, BeholderVerdict::Warn);

        for i in 5..10u32 {
            last = beholder
                .evaluate(Some(&intent), &format!("tool{i}"), &serde_json::json!({"i": i}), 0)
                .await;
        }
        assert_eq!(last.verdict, BeholderVerdict::Kill);
    }
}
