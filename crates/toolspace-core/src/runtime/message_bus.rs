// toolspace-core/src/runtime/message_bus.rs
// ============================================================================
// Module: Message Bus
// Description: Token-addressed publish, receive, and reply primitives.
// Purpose: Let tokens exchange messages without seeing each other's inboxes.
// Dependencies: crate::{core, interfaces}, serde, thiserror
// ============================================================================

//! ## Overview
//! One shared bus holds a partition per destination token. Receiving is
//! destructive and orders by priority (highest first), then enqueue order.
//! Peeking returns the same order without removal. Expired messages are
//! skipped on every read and purged on destructive reads.
//!
//! ## Invariants
//! - Every read path filters on `destination == caller`, not only the
//!   partition key.
//! - Only a message's destination can reply to it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::errors::AccessError;
use crate::core::identifiers::MessageId;
use crate::core::identifiers::Token;
use crate::core::time::Timestamp;
use crate::interfaces::Clock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Request expecting a response.
    Request,
    /// Response to an earlier message.
    Response,
    /// One-way notification.
    Notification,
    /// Event broadcast to a single destination.
    Event,
}

/// Delivery priority; declaration order is ascending.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    /// Lowest priority.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Elevated priority.
    High,
    /// Delivered before everything else.
    Urgent,
}

impl MessagePriority {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

/// A delivered or pending message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Message kind.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Sender token (omitted from serialized output).
    #[serde(skip)]
    pub source: Token,
    /// Recipient token (omitted from serialized output).
    #[serde(skip)]
    pub destination: Token,
    /// Message payload.
    pub content: Value,
    /// Delivery priority.
    pub priority: MessagePriority,
    /// Publish time.
    pub timestamp: Timestamp,
    /// Optional expiry.
    pub expires_at: Option<Timestamp>,
    /// Original message when this is a reply.
    pub reply_to: Option<MessageId>,
    /// Caller-supplied metadata.
    pub metadata: Value,
}

impl Message {
    /// Returns true when the message is past its expiry.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Inputs for publishing a message.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Message kind.
    pub message_type: MessageType,
    /// Sender token.
    pub source: Token,
    /// Recipient token.
    pub destination: Token,
    /// Message payload.
    pub content: Value,
    /// Delivery priority.
    pub priority: MessagePriority,
    /// Optional time-to-live in milliseconds.
    pub ttl_ms: Option<u64>,
    /// Optional metadata object.
    pub metadata: Option<Value>,
}

/// Bus limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageBusConfig {
    /// Maximum pending messages per destination.
    pub max_pending_per_token: usize,
    /// TTL applied when the publisher omits one.
    pub default_ttl_ms: Option<u64>,
    /// Received messages retained per token for replies.
    pub history_per_token: usize,
}

impl Default for MessageBusConfig {
    fn default() -> Self {
        Self {
            max_pending_per_token: 1_000,
            default_ttl_ms: None,
            history_per_token: 256,
        }
    }
}

/// Per-token message counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageStats {
    /// Pending, unexpired messages.
    pub pending: usize,
    /// Pending counts keyed by priority label.
    pub by_priority: BTreeMap<String, usize>,
    /// Messages published by this token.
    pub sent: u64,
    /// Messages received by this token.
    pub received: u64,
}

/// Message bus errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageBusError {
    /// Message not visible to the caller.
    #[error("message not found: {0}")]
    NotFound(String),
    /// Destination inbox is at capacity.
    #[error("inbox full: limit {0}")]
    InboxFull(usize),
    /// Bus lock failure.
    #[error("message bus error: {0}")]
    Internal(String),
}

impl From<MessageBusError> for AccessError {
    fn from(error: MessageBusError) -> Self {
        match error {
            MessageBusError::NotFound(id) => Self::not_found("message", id),
            MessageBusError::InboxFull(limit) => {
                Self::LimitExceeded(format!("destination inbox holds at most {limit} messages"))
            }
            MessageBusError::Internal(message) => Self::Internal(message),
        }
    }
}

// ============================================================================
// SECTION: Bus State
// ============================================================================

/// Pending message with its enqueue sequence.
#[derive(Debug, Clone)]
struct Queued {
    /// Monotonic enqueue sequence.
    sequence: u64,
    /// Message payload.
    message: Message,
}

/// Send/receive counters for one token.
#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    /// Messages published.
    sent: u64,
    /// Messages received.
    received: u64,
}

/// Shared bus state.
#[derive(Debug, Default)]
struct BusState {
    /// Next enqueue sequence.
    next_sequence: u64,
    /// Pending messages keyed by destination.
    inboxes: BTreeMap<Token, Vec<Queued>>,
    /// Recently received messages keyed by recipient.
    history: BTreeMap<Token, VecDeque<Message>>,
    /// Counters keyed by token.
    counters: BTreeMap<Token, Counters>,
}

// ============================================================================
// SECTION: Message Bus
// ============================================================================

/// Shared, destination-partitioned message bus.
pub struct MessageBus {
    /// Bus state.
    state: Mutex<BusState>,
    /// Time source for expiry.
    clock: Arc<dyn Clock>,
    /// Limits.
    config: MessageBusConfig,
}

impl MessageBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new(config: MessageBusConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            clock,
            config,
        }
    }

    /// Publishes a message to its destination.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::InboxFull`] when the destination is at
    /// capacity.
    pub fn publish(&self, request: PublishRequest) -> Result<Message, MessageBusError> {
        let now = self.clock.now();
        let ttl = request.ttl_ms.or(self.config.default_ttl_ms);
        let message = Message {
            id: MessageId::generate(),
            message_type: request.message_type,
            source: request.source,
            destination: request.destination,
            content: request.content,
            priority: request.priority,
            timestamp: now,
            expires_at: ttl.map(|ttl| now.plus_millis(ttl)),
            reply_to: None,
            metadata: request.metadata.unwrap_or_else(|| Value::Object(Map::new())),
        };
        self.enqueue(message)
    }

    /// Removes and returns up to `max` pending messages for `token`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::Internal`] when the bus lock is poisoned.
    pub fn receive_messages(
        &self,
        token: &Token,
        max: Option<usize>,
    ) -> Result<Vec<Message>, MessageBusError> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        let Some(inbox) = state.inboxes.get_mut(token) else {
            return Ok(Vec::new());
        };
        inbox.retain(|queued| !queued.message.is_expired(now));
        sort_for_delivery(inbox);
        let take = max.unwrap_or(inbox.len()).min(inbox.len());
        let delivered: Vec<Message> = inbox
            .drain(..take)
            .map(|queued| queued.message)
            .filter(|message| &message.destination == token)
            .collect();
        if inbox.is_empty() {
            state.inboxes.remove(token);
        }
        let history_limit = self.config.history_per_token;
        let history = state.history.entry(token.clone()).or_default();
        for message in &delivered {
            history.push_back(message.clone());
            while history.len() > history_limit {
                history.pop_front();
            }
        }
        let counters = state.counters.entry(token.clone()).or_default();
        counters.received += delivered.len() as u64;
        drop(state);
        Ok(delivered)
    }

    /// Returns pending messages for `token` without removing them.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::Internal`] when the bus lock is poisoned.
    pub fn get_pending_messages(&self, token: &Token) -> Result<Vec<Message>, MessageBusError> {
        let now = self.clock.now();
        let state = self.lock()?;
        let mut pending: Vec<Queued> = state
            .inboxes
            .get(token)
            .map(|inbox| {
                inbox
                    .iter()
                    .filter(|queued| {
                        &queued.message.destination == token && !queued.message.is_expired(now)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(state);
        sort_for_delivery(&mut pending);
        Ok(pending.into_iter().map(|queued| queued.message).collect())
    }

    /// Replies to a message previously addressed to `from`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::NotFound`] when `from` was not the
    /// original's destination or the original is no longer retained.
    pub fn reply(
        &self,
        original_id: &MessageId,
        from: &Token,
        content: Value,
        priority: Option<MessagePriority>,
    ) -> Result<Message, MessageBusError> {
        let original = self.find_addressed_to(original_id, from)?;
        let now = self.clock.now();
        let message = Message {
            id: MessageId::generate(),
            message_type: MessageType::Response,
            source: from.clone(),
            destination: original.source.clone(),
            content,
            priority: priority.unwrap_or(original.priority),
            timestamp: now,
            expires_at: self.config.default_ttl_ms.map(|ttl| now.plus_millis(ttl)),
            reply_to: Some(original.id),
            metadata: Value::Object(Map::new()),
        };
        self.enqueue(message)
    }

    /// Drops every pending and retained message and the counters for
    /// `token`. Returns the number of pending messages removed.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::Internal`] when the bus lock is poisoned.
    pub fn cleanup_user_messages(&self, token: &Token) -> Result<usize, MessageBusError> {
        let mut state = self.lock()?;
        let removed = state.inboxes.remove(token).map_or(0, |inbox| inbox.len());
        state.history.remove(token);
        state.counters.remove(token);
        drop(state);
        Ok(removed)
    }

    /// Returns message counts for `token`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::Internal`] when the bus lock is poisoned.
    pub fn get_stats(&self, token: &Token) -> Result<MessageStats, MessageBusError> {
        let pending = self.get_pending_messages(token)?;
        let state = self.lock()?;
        let counters = state.counters.get(token).copied().unwrap_or_default();
        drop(state);
        let mut stats = MessageStats {
            pending: pending.len(),
            sent: counters.sent,
            received: counters.received,
            ..MessageStats::default()
        };
        for message in &pending {
            *stats.by_priority.entry(message.priority.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(stats)
    }

    /// Purges expired messages from every inbox.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::Internal`] when the bus lock is poisoned.
    pub fn purge_expired(&self) -> Result<usize, MessageBusError> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        let mut purged = 0;
        for inbox in state.inboxes.values_mut() {
            let before = inbox.len();
            inbox.retain(|queued| !queued.message.is_expired(now));
            purged += before - inbox.len();
        }
        state.inboxes.retain(|_, inbox| !inbox.is_empty());
        drop(state);
        Ok(purged)
    }

    /// Stores a message in its destination inbox.
    fn enqueue(&self, message: Message) -> Result<Message, MessageBusError> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        let limit = self.config.max_pending_per_token;
        let inbox = state.inboxes.entry(message.destination.clone()).or_default();
        inbox.retain(|queued| !queued.message.is_expired(now));
        if inbox.len() >= limit {
            return Err(MessageBusError::InboxFull(limit));
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.inboxes.entry(message.destination.clone()).or_default().push(Queued {
            sequence,
            message: message.clone(),
        });
        state.counters.entry(message.source.clone()).or_default().sent += 1;
        drop(state);
        Ok(message)
    }

    /// Finds a pending or received message whose destination is `token`.
    fn find_addressed_to(
        &self,
        id: &MessageId,
        token: &Token,
    ) -> Result<Message, MessageBusError> {
        let state = self.lock()?;
        let pending = state
            .inboxes
            .get(token)
            .and_then(|inbox| inbox.iter().find(|queued| &queued.message.id == id))
            .map(|queued| queued.message.clone());
        let found = pending.or_else(|| {
            state
                .history
                .get(token)
                .and_then(|history| history.iter().find(|message| &message.id == id))
                .cloned()
        });
        drop(state);
        found
            .filter(|message| &message.destination == token)
            .ok_or_else(|| MessageBusError::NotFound(id.to_string()))
    }

    /// Locks the bus state.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BusState>, MessageBusError> {
        self.state
            .lock()
            .map_err(|_| MessageBusError::Internal("message bus mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Orders messages by priority descending, then enqueue order.
fn sort_for_delivery(messages: &mut [Queued]) {
    messages.sort_by_key(|queued| (Reverse(queued.message.priority), queued.sequence));
}
