// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay core for dmrelay.
//!
//! The [`Relay`] ties together:
//! - the conversation store and the correspondent set
//! - the pending buffers that catch live messages during a history fetch
//! - the reconciliation scheduler and its status register
//! - the debounced writer that persists every table
//!
//! The Discord adapter feeds it live messages; the binary reads from it.

pub mod conversation;
pub mod correspondents;
pub mod merge;
pub mod pending;
pub mod persist;
pub mod reconcile;
pub mod shutdown;
pub mod status;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dmrelay_config::DmRelayConfig;
use dmrelay_core::{
    Conversation, CorrespondentId, DmRelayError, HistorySource, JobState, Message, MessageSender,
    TriggerOutcome,
};
use dmrelay_storage::{
    ConversationsDoc, CorrespondentsDoc, DebouncedWriter, DurableStore, SaveHandle, StoredSettings,
    Table, save_channel,
};
use tracing::{debug, info};

pub use conversation::{ConversationStore, ConversationSummary};
pub use correspondents::CorrespondentSet;
pub use pending::{Offer, PendingQueue};
pub use reconcile::{ReconcileSettings, Reconciler, RunSummary};
pub use status::StatusRegister;

use crate::persist::{RelayExporter, SettingsCell};

/// Tunables for a [`Relay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    /// Trailing ids checked for redelivery on every live append.
    pub dedup_window: usize,
    /// Coalescing window of the debounced writer.
    pub debounce: Duration,
    pub reconcile: ReconcileSettings,
}

impl RelayOptions {
    pub fn from_config(config: &DmRelayConfig) -> Self {
        Self {
            dedup_window: config.history.dedup_window,
            debounce: config.storage.debounce(),
            reconcile: ReconcileSettings::from(&config.history),
        }
    }
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self::from_config(&DmRelayConfig::default())
    }
}

/// The relay: live ingestion, replies, reconciliation and persistence.
pub struct Relay {
    conversations: Arc<ConversationStore>,
    correspondents: Arc<CorrespondentSet>,
    pending: Arc<PendingQueue>,
    status: Arc<StatusRegister>,
    settings: Arc<SettingsCell>,
    reconciler: Reconciler,
    sender: Arc<dyn MessageSender>,
    connection: Mutex<Option<String>>,
    writer: Mutex<Option<DebouncedWriter>>,
}

impl Relay {
    /// Reload every table from `store` and start the debounced writer.
    ///
    /// Unreadable tables fall back to empty defaults. Must be called inside a
    /// tokio runtime.
    pub fn restore(
        store: DurableStore,
        options: RelayOptions,
        source: Arc<dyn HistorySource>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        let settings: StoredSettings = store.load_or_default(Table::Config);
        let correspondents: CorrespondentsDoc = store.load_or_default(Table::Correspondents);
        let conversations: ConversationsDoc = store.load_or_default(Table::Conversations);
        info!(
            path = %store.root().display(),
            correspondents = correspondents.len(),
            conversations = conversations.len(),
            "relay state restored"
        );

        let (saves, queue) = save_channel();
        let relay = Self::assemble(
            settings,
            correspondents,
            conversations,
            saves,
            options,
            source,
            sender,
        );
        let exporter = Arc::new(RelayExporter {
            settings: Arc::clone(&relay.settings),
            correspondents: Arc::clone(&relay.correspondents),
            conversations: Arc::clone(&relay.conversations),
        });
        let writer = DebouncedWriter::spawn(store, exporter, queue, options.debounce);
        *relay.writer_slot() = Some(writer);
        relay
    }

    /// A relay that never touches the disk.
    pub fn in_memory(
        options: RelayOptions,
        source: Arc<dyn HistorySource>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self::assemble(
            StoredSettings::default(),
            CorrespondentsDoc::new(),
            ConversationsDoc::new(),
            SaveHandle::detached(),
            options,
            source,
            sender,
        )
    }

    fn assemble(
        settings: StoredSettings,
        correspondents: CorrespondentsDoc,
        conversations: ConversationsDoc,
        saves: SaveHandle,
        options: RelayOptions,
        source: Arc<dyn HistorySource>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        let settings = Arc::new(SettingsCell::restore(settings, saves.clone()));
        let correspondents = Arc::new(CorrespondentSet::restore(correspondents, saves.clone()));
        let conversations = Arc::new(ConversationStore::restore(
            conversations,
            options.dedup_window,
            saves,
        ));
        let pending = Arc::new(PendingQueue::new());
        let status = Arc::new(StatusRegister::new());
        let reconciler = Reconciler::new(
            source,
            Arc::clone(&conversations),
            Arc::clone(&pending),
            Arc::clone(&correspondents),
            Arc::clone(&status),
            options.reconcile,
        );
        Self {
            conversations,
            correspondents,
            pending,
            status,
            settings,
            reconciler,
            sender,
            connection: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Route a message observed on the live stream.
    ///
    /// The correspondent is always recorded. The message goes to the pending
    /// buffer while that correspondent is being reconciled, otherwise straight
    /// into the conversation. Accepted inbound messages bump the unread count.
    /// Returns whether the message was accepted (not a redelivery).
    ///
    /// A buffered message whose id is already in the conversation tail is
    /// still buffered (the merge drops it) but does not count as accepted.
    /// The tail is checked before the offer: once buffered, the message may
    /// be committed by the reconciliation task at any moment.
    pub fn ingest_live(&self, correspondent: CorrespondentId, message: Message) -> bool {
        if self.correspondents.add(correspondent) {
            info!(%correspondent, "new correspondent");
        }
        let inbound = !message.author_is_self;
        let known = self.conversations.recently_contains(correspondent, message.id);
        let accepted = match self.pending.offer(correspondent, message) {
            Offer::Buffered => !known,
            Offer::Duplicate => false,
            Offer::NotBuffering(message) => self.conversations.append_local(correspondent, message),
        };
        if accepted && inbound {
            self.conversations.increment_unread(correspondent);
        }
        accepted
    }

    /// Send `body` to `correspondent` and record the sent message.
    ///
    /// Works for correspondents the relay has never seen.
    pub async fn send_reply(
        &self,
        correspondent: CorrespondentId,
        body: &str,
    ) -> Result<Message, DmRelayError> {
        if body.trim().is_empty() {
            return Err(DmRelayError::Channel {
                message: "refusing to send an empty message".into(),
                source: None,
            });
        }
        let sent = self.sender.send_direct(correspondent, body).await?;
        debug!(%correspondent, id = %sent.id, "reply sent");
        self.ingest_live(correspondent, sent.clone());
        Ok(sent)
    }

    /// Clear the unread counter, returning its previous value.
    pub fn mark_read(&self, correspondent: CorrespondentId) -> u32 {
        self.conversations.mark_read(correspondent)
    }

    pub fn total_unread(&self) -> u64 {
        self.conversations.total_unread()
    }

    pub fn conversation_snapshot(&self, correspondent: CorrespondentId) -> Option<Conversation> {
        self.conversations.snapshot(correspondent)
    }

    pub fn conversation_summaries(&self) -> Vec<ConversationSummary> {
        self.conversations.summaries()
    }

    pub fn correspondents(&self) -> Vec<CorrespondentId> {
        self.correspondents.snapshot()
    }

    pub fn status_snapshot(&self) -> JobState {
        self.status.read()
    }

    /// Start a background reconciliation run.
    pub fn trigger_reconciliation(&self) -> TriggerOutcome {
        self.reconciler.trigger()
    }

    /// Run reconciliation and wait for it to finish.
    pub async fn run_reconciliation(&self) -> Result<RunSummary, DmRelayError> {
        self.reconciler.run().await
    }

    pub fn set_connection_status(&self, status: impl Into<String>) {
        *self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(status.into());
    }

    pub fn connection_status(&self) -> Option<String> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Token saved in the config table, if any.
    pub fn stored_token(&self) -> Option<String> {
        self.settings.get().token
    }

    pub fn set_stored_token(&self, token: impl Into<String>) {
        self.settings.set_token(Some(token.into()));
    }

    /// Cancel any running reconciliation, then flush every pending save.
    pub async fn shutdown(&self) {
        self.reconciler.stop().await;
        let writer = self.writer_slot().take();
        if let Some(writer) = writer {
            writer.shutdown().await;
        }
        info!("relay shut down");
    }

    fn writer_slot(&self) -> std::sync::MutexGuard<'_, Option<DebouncedWriter>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
