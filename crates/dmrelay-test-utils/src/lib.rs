// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for dmrelay.
//!
//! Scripted collaborators so relay and reconciliation tests run without a
//! network connection.
//!
//! # Components
//!
//! - [`MockHistory`] - history source with per-correspondent scripts, delays and hooks
//! - [`MockSender`] - message sender that captures every send

pub mod mock_history;
pub mod mock_sender;

pub use mock_history::{FetchScript, MockHistory};
pub use mock_sender::MockSender;

use chrono::{DateTime, TimeZone, Utc};

/// A fixed timestamp `secs` seconds after an arbitrary epoch, for readable fixtures.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .unwrap_or_default()
}
