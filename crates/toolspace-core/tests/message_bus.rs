// toolspace-core/tests/message_bus.rs
// ============================================================================
// Module: Message Bus Tests
// Description: Delivery order, isolation, replies, and expiry.
// ============================================================================
//! ## Overview
//! Exercises the bus with a manual clock so ttl handling is deterministic.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;

use serde_json::json;
use toolspace_core::ManualClock;
use toolspace_core::MessageBus;
use toolspace_core::MessageBusConfig;
use toolspace_core::MessagePriority;
use toolspace_core::MessageType;
use toolspace_core::PublishRequest;
use toolspace_core::Timestamp;
use toolspace_core::Token;
use toolspace_core::runtime::MessageBusError;

fn bus(config: MessageBusConfig) -> (MessageBus, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(0)));
    (MessageBus::new(config, clock.clone()), clock)
}

fn request(from: &str, to: &str, priority: MessagePriority, ttl_ms: Option<u64>) -> PublishRequest {
    PublishRequest {
        message_type: MessageType::Notification,
        source: Token::new(from),
        destination: Token::new(to),
        content: json!({"priority": priority.as_str()}),
        priority,
        ttl_ms,
        metadata: None,
    }
}

/// Verifies higher priority wins over enqueue order and the sender never
/// receives its own message.
#[test]
fn priority_then_fifo() {
    let (bus, _clock) = bus(MessageBusConfig::default());
    let low = bus.publish(request("a", "b", MessagePriority::Low, None)).unwrap();
    let first_normal = bus.publish(request("a", "b", MessagePriority::Normal, None)).unwrap();
    let second_normal = bus.publish(request("a", "b", MessagePriority::Normal, None)).unwrap();
    let urgent = bus.publish(request("a", "b", MessagePriority::Urgent, None)).unwrap();

    assert!(bus.receive_messages(&Token::new("a"), None).unwrap().is_empty());
    let order: Vec<_> = bus.receive_messages(&Token::new("b"), None).unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(order, vec![urgent.id, first_normal.id, second_normal.id, low.id]);
    assert!(bus.get_pending_messages(&Token::new("b")).unwrap().is_empty());
}

/// Verifies pending sets of different tokens never overlap and `max` limits
/// delivery.
#[test]
fn inboxes_are_isolated() {
    let (bus, _clock) = bus(MessageBusConfig::default());
    bus.publish(request("c", "a", MessagePriority::Normal, None)).unwrap();
    bus.publish(request("c", "b", MessagePriority::Normal, None)).unwrap();
    bus.publish(request("c", "b", MessagePriority::High, None)).unwrap();

    let a = bus.get_pending_messages(&Token::new("a")).unwrap();
    let b = bus.get_pending_messages(&Token::new("b")).unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 2);
    assert!(a.iter().all(|message| b.iter().all(|other| other.id != message.id)));

    let first = bus.receive_messages(&Token::new("b"), Some(1)).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].priority, MessagePriority::High);
    assert_eq!(bus.get_stats(&Token::new("b")).unwrap().pending, 1);
}

/// Verifies only the destination can reply and the reply routes back.
#[test]
fn replies_route_to_the_original_sender() {
    let (bus, _clock) = bus(MessageBusConfig::default());
    let original = bus.publish(request("a", "b", MessagePriority::High, None)).unwrap();
    assert!(matches!(
        bus.reply(&original.id, &Token::new("c"), json!("intruder"), None),
        Err(MessageBusError::NotFound(_))
    ));

    bus.receive_messages(&Token::new("b"), None).unwrap();
    let reply = bus.reply(&original.id, &Token::new("b"), json!("ack"), None).unwrap();
    assert_eq!(reply.message_type, MessageType::Response);
    assert_eq!(reply.priority, MessagePriority::High);

    let received = bus.receive_messages(&Token::new("a"), None).unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].reply_to, Some(original.id));
    let stats = bus.get_stats(&Token::new("b")).unwrap();
    assert_eq!((stats.sent, stats.received), (1, 1));
}

/// Verifies expired messages are skipped and purged.
#[test]
fn expired_messages_are_dropped() {
    let (bus, clock) = bus(MessageBusConfig::default());
    bus.publish(request("a", "b", MessagePriority::Normal, Some(100))).unwrap();
    bus.publish(request("a", "b", MessagePriority::Normal, None)).unwrap();
    clock.advance(100);
    assert_eq!(bus.get_pending_messages(&Token::new("b")).unwrap().len(), 1);
    assert_eq!(bus.purge_expired().unwrap(), 1);
    assert_eq!(bus.cleanup_user_messages(&Token::new("b")).unwrap(), 1);
}

/// Verifies the per-destination cap rejects further publishes.
#[test]
fn full_inbox_rejects_publish() {
    let (bus, _clock) = bus(MessageBusConfig {
        max_pending_per_token: 1,
        ..MessageBusConfig::default()
    });
    bus.publish(request("a", "b", MessagePriority::Normal, None)).unwrap();
    assert_eq!(
        bus.publish(request("a", "b", MessagePriority::Normal, None)).unwrap_err(),
        MessageBusError::InboxFull(1)
    );
    bus.publish(request("a", "c", MessagePriority::Normal, None)).unwrap();
}

/// Verifies cleanup forgets a token's counters along with its messages.
#[test]
fn cleanup_resets_counters() {
    let (bus, _clock) = bus(MessageBusConfig::default());
    bus.publish(request("a", "b", MessagePriority::Normal, None)).unwrap();
    bus.publish(request("b", "a", MessagePriority::Normal, None)).unwrap();
    bus.receive_messages(&Token::new("b"), None).unwrap();
    let stats = bus.get_stats(&Token::new("b")).unwrap();
    assert_eq!((stats.sent, stats.received), (1, 1));

    bus.cleanup_user_messages(&Token::new("b")).unwrap();
    let stats = bus.get_stats(&Token::new("b")).unwrap();
    assert_eq!((stats.sent, stats.received, stats.pending), (0, 0, 0));
    assert_eq!(bus.get_pending_messages(&Token::new("a")).unwrap().len(), 1);
}
