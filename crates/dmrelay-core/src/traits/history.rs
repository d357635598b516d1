// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! History fetch collaborator consumed by the reconciliation scheduler.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::DmRelayError;
use crate::types::{CorrespondentId, Message};

/// Source of a correspondent's full direct-message history.
#[async_trait]
pub trait HistorySource: Send + Sync + 'static {
    /// Fetches up to `limit` of the most recent messages exchanged with
    /// `correspondent`, oldest first.
    ///
    /// Implementations should give up promptly once `cancel` fires; the
    /// caller discards whatever they return after that. Failures are reported
    /// as [`DmRelayError::Transient`] or [`DmRelayError::Auth`].
    async fn fetch_history(
        &self,
        correspondent: CorrespondentId,
        limit: usize,
        cancel: CancellationToken,
    ) -> Result<Vec<Message>, DmRelayError>;
}
