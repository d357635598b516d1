// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridges the in-memory stores to the debounced writer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dmrelay_core::DmRelayError;
use dmrelay_storage::{DurableStore, SaveHandle, StoredSettings, Table, TableExporter};

use crate::conversation::ConversationStore;
use crate::correspondents::CorrespondentSet;

/// Settings document kept in memory between saves.
pub struct SettingsCell {
    settings: Mutex<StoredSettings>,
    saves: SaveHandle,
}

impl SettingsCell {
    pub fn restore(settings: StoredSettings, saves: SaveHandle) -> Self {
        Self {
            settings: Mutex::new(settings),
            saves,
        }
    }

    pub fn get(&self) -> StoredSettings {
        self.lock().clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        self.lock().token = token;
        self.saves.schedule(Table::Config);
    }

    fn lock(&self) -> MutexGuard<'_, StoredSettings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Snapshots each table under its store's lock, then saves outside it.
pub struct RelayExporter {
    pub(crate) settings: Arc<SettingsCell>,
    pub(crate) correspondents: Arc<CorrespondentSet>,
    pub(crate) conversations: Arc<ConversationStore>,
}

#[async_trait]
impl TableExporter for RelayExporter {
    async fn export(&self, table: Table, store: &DurableStore) -> Result<(), DmRelayError> {
        match table {
            Table::Config => {
                let doc = self.settings.get();
                store.save(table, &doc).await
            }
            Table::Correspondents => {
                let doc = self.correspondents.snapshot();
                store.save(table, &doc).await
            }
            Table::Conversations => {
                let doc = self.conversations.export();
                store.save(table, &doc).await
            }
        }
    }
}
