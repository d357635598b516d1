// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for dmrelay.

use thiserror::Error;

/// The error type used across every dmrelay crate boundary.
#[derive(Debug, Error)]
pub enum DmRelayError {
    /// Configuration errors (invalid TOML, missing token, bad tunables).
    #[error("configuration error: {0}")]
    Config(String),

    /// Durable store I/O failures.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A persisted table could not be decoded.
    #[error("corrupt data in table `{table}`: {source}")]
    CorruptData {
        table: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Remote service hiccup. Worth retrying on a later run.
    #[error("transient remote error: {message}")]
    Transient {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Credential or permission problem, possibly specific to one correspondent.
    #[error("authorization error: {message}")]
    Auth { message: String },

    /// Channel connection or delivery failure outside of history fetches.
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// A reconciliation run is already in progress.
    #[error("a reconciliation run is already in progress")]
    JobAlreadyRunning,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DmRelayError {
    /// Whether a later attempt at the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DmRelayError::Transient { .. })
    }

    /// Whether this error describes a failed history fetch for one correspondent.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            DmRelayError::Transient { .. }
                | DmRelayError::Auth { .. }
                | DmRelayError::Timeout { .. }
        )
    }
}
