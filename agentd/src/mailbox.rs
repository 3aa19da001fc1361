//! Priority Mailbox (spec §3 Priority Message, §4.9)
//!
//! A typed, TTL-aware message queue. Messages are stored in insertion
//! order; `list` filters and sorts for delivery without mutating storage,
//! acknowledgement and TTL expiry are explicit separate steps. Grounded on
//! the teacher's `coordinator/messages.rs` enum-of-message-kinds vocabulary,
//! generalized from a fixed coordinator protocol to the spec's typed
//! priority queue.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Critical,
    High,
    Normal,
    Low,
}

impl MessagePriority {
    fn rank(self) -> u8 {
        match self {
            MessagePriority::Critical => 0,
            MessagePriority::High => 1,
            MessagePriority::Normal => 2,
            MessagePriority::Low => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Context,
    Alert,
    DecisionRequest,
    Directive,
    Progress,
    NeedsContext,
    Heartbeat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub priority: MessagePriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
    #[serde(default)]
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired: Option<bool>,
}

impl PriorityMessage {
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        content: impl Into<String>,
        message_type: MessageType,
        priority: MessagePriority,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            content: content.into(),
            message_type,
            priority,
            topic: None,
            task_id: None,
            metadata: None,
            timestamp: Utc::now(),
            ttl_ms: None,
            delivered: false,
            delivered_at: None,
            expired: None,
        }
    }

    pub fn with_ttl(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_ms {
            Some(ttl) => (now - self.timestamp).num_milliseconds() > ttl as i64,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub topic: Option<String>,
    pub message_type: Option<MessageType>,
    pub include_delivered: bool,
}

/// Insertion-ordered store of priority messages.
pub struct Mailbox {
    messages: Mutex<Vec<PriorityMessage>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self { messages: Mutex::new(Vec::new()) }
    }

    pub fn send(&self, message: PriorityMessage) {
        debug!(to = %message.to, ?message.priority, "Mailbox::send: called");
        self.messages.lock().expect("mailbox mutex poisoned").push(message);
    }

    /// List messages for `recipient`, marking TTL-expired ones as expired as
    /// a side effect of being read, sorted by priority rank then timestamp.
    pub fn list(&self, recipient: &str, options: &ListOptions) -> Vec<PriorityMessage> {
        debug!(%recipient, "Mailbox::list: called");
        let now = Utc::now();
        let mut messages = self.messages.lock().expect("mailbox mutex poisoned");

        for message in messages.iter_mut() {
            if message.to == recipient && message.is_expired(now) {
                message.expired = Some(true);
            }
        }

        let mut matches: Vec<PriorityMessage> = messages
            .iter()
            .filter(|m| m.to == recipient)
            .filter(|m| options.include_delivered || !m.delivered)
            .filter(|m| options.topic.as_deref().is_none_or(|t| m.topic.as_deref() == Some(t)))
            .filter(|m| options.message_type.is_none_or(|t| m.message_type == t))
            .cloned()
            .collect();

        matches.sort_by(|a, b| a.priority.rank().cmp(&b.priority.rank()).then(a.timestamp.cmp(&b.timestamp)));
        matches
    }

    /// Explicitly acknowledge delivery of a message.
    pub fn acknowledge(&self, message_id: &str) -> bool {
        debug!(%message_id, "Mailbox::acknowledge: called");
        let mut messages = self.messages.lock().expect("mailbox mutex poisoned");
        match messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) => {
                message.delivered = true;
                message.delivered_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Prune delivered or TTL-expired messages in bulk, returning the count removed.
    pub fn prune(&self) -> usize {
        debug!("Mailbox::prune: called");
        let now = Utc::now();
        let mut messages = self.messages.lock().expect("mailbox mutex poisoned");
        let before = messages.len();
        messages.retain(|m| !m.delivered && !m.is_expired(now));
        before - messages.len()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().expect("mailbox mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}
