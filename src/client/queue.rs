//! Bounded outbound message queue.
//!
//! Messages submitted while the connection is down wait here and are
//! replayed in FIFO order on the next successful open. Overflow evicts the
//! oldest entry.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use tokio::time::Instant;

use crate::identifiers::CorrelationId;
use crate::protocol::OutboundMessage;

// ============================================================================
// QueuedMessage
// ============================================================================

/// A message waiting for a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub payload: OutboundMessage,
    pub enqueued_at: Instant,
    /// Failed replays so far.
    pub retries: u32,
}

impl QueuedMessage {
    /// Wraps a fresh message.
    #[inline]
    #[must_use]
    pub fn new(payload: OutboundMessage, enqueued_at: Instant) -> Self {
        Self {
            payload,
            enqueued_at,
            retries: 0,
        }
    }

    /// Correlation id of a wrapped trigger request.
    #[inline]
    #[must_use]
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.payload.correlation_id()
    }
}

// ============================================================================
// RequeueOutcome
// ============================================================================

/// Result of putting a failed message back.
#[derive(Debug)]
pub enum RequeueOutcome {
    /// Back in the queue; `evicted` was pushed out to make room.
    Requeued { evicted: Option<QueuedMessage> },
    /// Retry ceiling reached; the message is gone.
    Dropped(QueuedMessage),
}

// ============================================================================
// MessageQueue
// ============================================================================

/// FIFO with a fixed capacity and lossy-oldest overflow.
#[derive(Debug)]
pub struct MessageQueue {
    entries: VecDeque<QueuedMessage>,
    capacity: usize,
    max_retries: u32,
}

impl MessageQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(capacity: usize, max_retries: u32) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            max_retries,
        }
    }

    /// Appends a message, returning the entry evicted to make room.
    ///
    /// With zero capacity nothing is stored and the new entry itself is
    /// returned.
    pub fn enqueue(&mut self, message: QueuedMessage) -> Option<QueuedMessage> {
        if self.capacity == 0 {
            return Some(message);
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(message);
        evicted
    }

    /// Puts back a message whose replay failed.
    pub fn requeue(&mut self, mut message: QueuedMessage) -> RequeueOutcome {
        message.retries += 1;
        if message.retries > self.max_retries {
            return RequeueOutcome::Dropped(message);
        }
        match self.enqueue(message) {
            Some(evicted) if self.capacity == 0 => RequeueOutcome::Dropped(evicted),
            evicted => RequeueOutcome::Requeued { evicted },
        }
    }

    /// Removes a queued trigger request by correlation id.
    pub fn remove_correlated(&mut self, id: CorrelationId) -> Option<QueuedMessage> {
        let index = self
            .entries
            .iter()
            .position(|m| m.correlation_id() == Some(id))?;
        self.entries.remove(index)
    }

    /// Takes every entry in FIFO order.
    pub fn drain(&mut self) -> Vec<QueuedMessage> {
        self.entries.drain(..).collect()
    }

    /// Iterates in FIFO order.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.entries.iter()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    use crate::protocol::TriggerWorkflow;

    fn message(n: usize) -> QueuedMessage {
        QueuedMessage::new(
            OutboundMessage::custom("note", json!({ "n": n })),
            Instant::now(),
        )
    }

    fn numbers(queue: &MessageQueue) -> Vec<u64> {
        queue
            .iter()
            .filter_map(|m| match &m.payload {
                OutboundMessage::Custom(env) => env.data["n"].as_u64(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_overflow_keeps_newest() {
        let mut queue = MessageQueue::new(3, 3);
        for n in 1..=5 {
            queue.enqueue(message(n));
        }
        assert_eq!(numbers(&queue), vec![3, 4, 5]);
    }

    #[test]
    fn test_enqueue_returns_evicted() {
        let mut queue = MessageQueue::new(1, 3);
        assert!(queue.enqueue(message(1)).is_none());
        let evicted = queue.enqueue(message(2)).expect("evicted");
        assert_eq!(evicted.payload, message(1).payload);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut queue = MessageQueue::new(0, 3);
        assert!(queue.enqueue(message(1)).is_some());
        assert!(queue.is_empty());
        assert!(matches!(
            queue.requeue(message(2)),
            RequeueOutcome::Dropped(_)
        ));
    }

    #[test]
    fn test_requeue_until_ceiling() {
        let mut queue = MessageQueue::new(10, 2);
        let mut entry = message(1);

        for expected in 1..=2 {
            match queue.requeue(entry) {
                RequeueOutcome::Requeued { evicted: None } => {}
                other => panic!("unexpected {other:?}"),
            }
            entry = queue.drain().pop().expect("requeued");
            assert_eq!(entry.retries, expected);
        }

        match queue.requeue(entry) {
            RequeueOutcome::Dropped(dropped) => assert_eq!(dropped.retries, 3),
            other => panic!("unexpected {other:?}"),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_preserves_order() {
        let mut queue = MessageQueue::new(10, 3);
        for n in 0..4 {
            queue.enqueue(message(n));
        }
        let drained: Vec<_> = queue.drain().into_iter().map(|m| m.payload).collect();
        assert_eq!(drained.len(), 4);
        assert_eq!(drained[0], message(0).payload);
        assert_eq!(drained[3], message(3).payload);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_correlated() {
        let mut queue = MessageQueue::new(10, 3);
        let id = CorrelationId::generate();
        queue.enqueue(message(1));
        queue.enqueue(QueuedMessage::new(
            TriggerWorkflow::new("adw_plan").with_request_id(id).into(),
            Instant::now(),
        ));

        assert!(queue.remove_correlated(id).is_some());
        assert!(queue.remove_correlated(id).is_none());
        assert_eq!(numbers(&queue), vec![1]);
    }

    proptest! {
        #[test]
        fn test_overflow_retains_capacity(capacity in 1usize..32, count in 0usize..128) {
            let mut queue = MessageQueue::new(capacity, 3);
            let mut evicted = Vec::new();
            for n in 0..count {
                if let Some(e) = queue.enqueue(message(n)) {
                    evicted.push(e);
                }
            }

            prop_assert_eq!(queue.len(), count.min(capacity));
            prop_assert_eq!(evicted.len(), count.saturating_sub(capacity));

            let expected: Vec<u64> = (count.saturating_sub(capacity)..count)
                .map(|n| n as u64)
                .collect();
            prop_assert_eq!(numbers(&queue), expected);
        }
    }
}
