// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits implemented by remote chat-service adapters.
//!
//! Both traits use `#[async_trait]` so they can be held as
//! `Arc<dyn Trait>` by the relay.

pub mod history;
pub mod sender;

pub use history::HistorySource;
pub use sender::MessageSender;
