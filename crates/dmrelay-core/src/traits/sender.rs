// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound direct-message delivery.

use async_trait::async_trait;

use crate::error::DmRelayError;
use crate::types::{CorrespondentId, Message};

/// Sends direct messages on behalf of the bot account.
#[async_trait]
pub trait MessageSender: Send + Sync + 'static {
    /// Delivers `body` to `correspondent` and returns the message as the
    /// service recorded it (with `author_is_self` set).
    async fn send_direct(
        &self,
        correspondent: CorrespondentId,
        body: &str,
    ) -> Result<Message, DmRelayError>;
}
