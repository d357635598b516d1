// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for dmrelay.
//!
//! Holds the error taxonomy, the domain types shared by every crate in the
//! workspace, and the traits through which the relay talks to the remote
//! chat service.

pub mod error;
pub mod traits;
pub mod types;

pub use error::DmRelayError;
pub use traits::{HistorySource, MessageSender};
pub use types::{
    Conversation, CorrespondentId, JobPhase, JobState, Message, MessageId, TriggerOutcome,
};
