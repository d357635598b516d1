// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock message sender that records every outgoing message.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dmrelay_core::{CorrespondentId, DmRelayError, Message, MessageSender};

/// Captures sends and answers with self-authored messages carrying fresh ids.
pub struct MockSender {
    sent: Mutex<Vec<(CorrespondentId, Message)>>,
    next_id: AtomicU64,
    failing: AtomicBool,
}

impl MockSender {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(900_000),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every later send fail with a channel error.
    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(CorrespondentId, Message)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for MockSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSender for MockSender {
    async fn send_direct(
        &self,
        correspondent: CorrespondentId,
        body: &str,
    ) -> Result<Message, DmRelayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DmRelayError::Channel {
                message: format!("scripted send failure to {correspondent}"),
                source: None,
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = Message::outbound(id, Utc::now(), body);
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((correspondent, message.clone()));
        Ok(message)
    }
}
