// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-correspondent buffers for messages that arrive while that
//! correspondent's history is being fetched.
//!
//! The buffer opens before the fetch starts and is detached atomically when
//! the fetch returns, so a live message either lands in the buffer (and is
//! merged) or misses it and goes straight to the conversation store. It can
//! never do both, and it can never do neither.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use dmrelay_core::{CorrespondentId, Message};

/// What happened to an offered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    /// Held until the reconciliation task drains the buffer.
    Buffered,
    /// The buffer already holds a message with this id.
    Duplicate,
    /// No buffer is open; the message is handed back to the caller.
    NotBuffering(Message),
}

#[derive(Default)]
pub struct PendingQueue {
    buffers: Mutex<HashMap<CorrespondentId, Vec<Message>>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a buffer for `correspondent`. Idempotent: returns `false` and keeps
    /// the existing contents if one is already open.
    pub fn begin(&self, correspondent: CorrespondentId) -> bool {
        let mut buffers = self.lock();
        if buffers.contains_key(&correspondent) {
            return false;
        }
        buffers.insert(correspondent, Vec::new());
        true
    }

    pub fn offer(&self, correspondent: CorrespondentId, message: Message) -> Offer {
        match self.lock().get_mut(&correspondent) {
            None => Offer::NotBuffering(message),
            Some(buffer) if buffer.iter().any(|m| m.id == message.id) => Offer::Duplicate,
            Some(buffer) => {
                buffer.push(message);
                Offer::Buffered
            }
        }
    }

    /// Detach and return the buffer. Later offers for `correspondent` are
    /// handed back until `begin` is called again.
    pub fn drain_and_close(&self, correspondent: CorrespondentId) -> Vec<Message> {
        self.lock().remove(&correspondent).unwrap_or_default()
    }

    pub fn is_buffering(&self, correspondent: CorrespondentId) -> bool {
        self.lock().contains_key(&correspondent)
    }

    /// Number of correspondents with an open buffer.
    pub fn open_buffers(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrespondentId, Vec<Message>>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const BOB: CorrespondentId = CorrespondentId(2);

    #[test]
    fn offer_without_buffer_hands_message_back() {
        let queue = PendingQueue::new();
        let msg = Message::inbound(1, Utc::now(), "hi");
        assert_eq!(queue.offer(BOB, msg.clone()), Offer::NotBuffering(msg));
    }

    #[test]
    fn buffered_messages_drain_in_order() {
        let queue = PendingQueue::new();
        assert!(queue.begin(BOB));
        let now = Utc::now();
        assert_eq!(queue.offer(BOB, Message::inbound(1, now, "a")), Offer::Buffered);
        assert_eq!(queue.offer(BOB, Message::inbound(2, now, "b")), Offer::Buffered);
        assert_eq!(queue.offer(BOB, Message::inbound(1, now, "a")), Offer::Duplicate);

        let drained = queue.drain_and_close(BOB);
        let ids: Vec<u64> = drained.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(!queue.is_buffering(BOB));
    }

    #[test]
    fn begin_is_idempotent() {
        let queue = PendingQueue::new();
        assert!(queue.begin(BOB));
        queue.offer(BOB, Message::inbound(1, Utc::now(), "kept"));
        assert!(!queue.begin(BOB));
        assert_eq!(queue.drain_and_close(BOB).len(), 1);
    }

    #[test]
    fn offers_after_close_are_not_captured() {
        let queue = PendingQueue::new();
        queue.begin(BOB);
        assert!(queue.drain_and_close(BOB).is_empty());
        assert!(matches!(
            queue.offer(BOB, Message::inbound(9, Utc::now(), "late")),
            Offer::NotBuffering(_)
        ));
        assert!(queue.drain_and_close(BOB).is_empty());
        assert_eq!(queue.open_buffers(), 0);
    }
}
