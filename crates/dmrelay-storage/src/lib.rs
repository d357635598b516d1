// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable persistence for dmrelay.
//!
//! Three independent JSON tables live in one data directory. Every save goes
//! to a temporary file beside the target and is renamed over it, so readers
//! and crash recovery only ever observe whole documents. Saves are coalesced
//! by a background [`DebouncedWriter`].

pub mod models;
pub mod store;
pub mod table;
pub mod writer;

pub use models::{ConversationsDoc, CorrespondentsDoc, StoredSettings};
pub use store::DurableStore;
pub use table::Table;
pub use writer::{DebouncedWriter, SaveHandle, SaveQueue, TableExporter, save_channel};
