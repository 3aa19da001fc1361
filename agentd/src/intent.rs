//! Intent Parser & Validator (spec §4.4)
//!
//! Assistant text may carry `<intent>{...}</intent>` JSON blocks declaring
//! what a following tool call is meant to do. The parser is permissive:
//! malformed blocks are silently skipped rather than failing the turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::llm::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Read,
    Write,
    Exec,
    Destructive,
}

impl RiskLevel {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(RiskLevel::Read),
            "write" => Some(RiskLevel::Write),
            "exec" => Some(RiskLevel::Exec),
            "destructive" => Some(RiskLevel::Destructive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDeclaration {
    pub tool_name: String,
    pub purpose: String,
    pub expected_outcome: String,
    pub risk_level: RiskLevel,
    pub timestamp: DateTime<Utc>,
}

/// A tool call with no matching declared intent.
#[derive(Debug, Clone)]
pub struct UnmatchedCall {
    pub tool_call_id: String,
    pub tool_name: String,
}

/// Result of validating a batch of tool calls against declared intents.
#[derive(Debug, Clone, Default)]
pub struct IntentValidation {
    /// Tool calls paired with the risk level of the intent that covered them.
    pub matched: Vec<(String, RiskLevel)>,
    pub unmatched: Vec<UnmatchedCall>,
}

impl IntentValidation {
    pub fn is_valid(&self) -> bool {
        self.unmatched.is_empty()
    }

    pub fn risk_for(&self, tool_call_id: &str) -> Option<RiskLevel> {
        self.matched
            .iter()
            .find(|(id, _)| id == tool_call_id)
            .map(|(_, risk)| *risk)
    }
}

/// Scan assistant text for `<intent>...</intent>` blocks and decode each
/// body as JSON. Only payloads with a string `toolName`/`purpose`/
/// `expectedOutcome` and a recognized `riskLevel` are accepted; everything
/// else (malformed JSON, missing fields, unknown risk) is silently
/// skipped. A missing `timestamp` defaults to now.
pub fn parse_intents(text: &str) -> Vec<IntentDeclaration> {
    debug!(text_len = %text.len(), "parse_intents: called");
    let mut intents = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("<intent>") {
        let after_open = &rest[start + "<intent>".len()..];
        let Some(end) = after_open.find("</intent>") else {
            break;
        };
        let body = &after_open[..end];
        rest = &after_open[end + "</intent>".len()..];

        if let Some(intent) = parse_intent_body(body) {
            intents.push(intent);
        }
    }

    debug!(count = %intents.len(), "parse_intents: returning");
    intents
}

fn parse_intent_body(body: &str) -> Option<IntentDeclaration> {
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;

    let tool_name = value.get("toolName")?.as_str()?.to_string();
    let purpose = value.get("purpose")?.as_str()?.to_string();
    let expected_outcome = value.get("expectedOutcome")?.as_str()?.to_string();
    let risk_level = RiskLevel::parse(value.get("riskLevel")?.as_str()?)?;
    let timestamp = value
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(IntentDeclaration {
        tool_name,
        purpose,
        expected_outcome,
        risk_level,
        timestamp,
    })
}

/// Build a multiset of declared intents keyed by `toolName`; for each tool
/// call in order, consume one intent of the matching name. Calls with no
/// matching intent come back as `unmatched`.
pub fn validate_intents(intents: &[IntentDeclaration], tool_calls: &[ToolCall]) -> IntentValidation {
    debug!(intents = %intents.len(), calls = %tool_calls.len(), "validate_intents: called");
    let mut pool: HashMap<&str, Vec<RiskLevel>> = HashMap::new();
    for intent in intents {
        pool.entry(intent.tool_name.as_str()).or_default().push(intent.risk_level);
    }

    let mut matched = Vec::new();
    let mut unmatched = Vec::new();

    for call in tool_calls {
        match pool.get_mut(call.name.as_str()).and_then(|risks| risks.pop()) {
            Some(risk) => matched.push((call.id.clone(), risk)),
            None => unmatched.push(UnmatchedCall {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
            }),
        }
    }

    IntentValidation { matched, unmatched }
}
