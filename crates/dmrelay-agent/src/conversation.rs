// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory conversation store.
//!
//! One mutex guards the whole map. Critical sections only touch memory; every
//! successful mutation marks the conversations table dirty so the debounced
//! writer persists it later.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use dmrelay_core::{Conversation, CorrespondentId, Message, MessageId};
use dmrelay_storage::{ConversationsDoc, SaveHandle, Table};
use tracing::debug;

use crate::merge::merge;

/// Per-conversation figures shown in listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub correspondent: CorrespondentId,
    pub message_count: usize,
    pub unread_count: u32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_reconciled_at: Option<DateTime<Utc>>,
}

/// Result of committing a reconciled sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileCommit {
    pub before: usize,
    pub after: usize,
}

/// Thread-safe map from correspondent to conversation.
pub struct ConversationStore {
    conversations: Mutex<HashMap<CorrespondentId, Conversation>>,
    dedup_window: usize,
    saves: SaveHandle,
}

impl ConversationStore {
    /// An empty store. `dedup_window` is how many trailing ids `append_local` checks.
    pub fn new(dedup_window: usize, saves: SaveHandle) -> Self {
        Self::restore(ConversationsDoc::new(), dedup_window, saves)
    }

    /// A store pre-populated from the persisted conversations table.
    pub fn restore(doc: ConversationsDoc, dedup_window: usize, saves: SaveHandle) -> Self {
        Self {
            conversations: Mutex::new(doc.into_iter().collect()),
            dedup_window: dedup_window.max(1),
            saves,
        }
    }

    /// Append a locally observed message unless its id is among the last
    /// `dedup_window` ids. Returns whether it was appended.
    pub fn append_local(&self, correspondent: CorrespondentId, message: Message) -> bool {
        let appended = {
            let mut map = self.lock();
            let convo = map.entry(correspondent).or_default();
            let redelivered = convo.tail_contains(message.id, self.dedup_window);
            if !redelivered {
                convo.messages.push(message);
            }
            !redelivered
        };
        if appended {
            self.saves.schedule(Table::Conversations);
        } else {
            debug!(%correspondent, "dropped redelivered message");
        }
        appended
    }

    /// Whether `id` is among the last `dedup_window` messages of the conversation.
    pub fn recently_contains(&self, correspondent: CorrespondentId, id: MessageId) -> bool {
        self.lock()
            .get(&correspondent)
            .is_some_and(|convo| convo.tail_contains(id, self.dedup_window))
    }

    /// Commit a reconciled sequence.
    ///
    /// `merged` is merged once more with the conversation as it is now, so
    /// anything appended after the caller took its snapshot is kept. The
    /// unread counter is left alone.
    pub fn replace_reconciled(
        &self,
        correspondent: CorrespondentId,
        merged: Vec<Message>,
    ) -> ReconcileCommit {
        let commit = {
            let mut map = self.lock();
            let convo = map.entry(correspondent).or_default();
            let before = convo.messages.len();
            convo.messages = merge(&convo.messages, &merged, &[]);
            convo.last_reconciled_at = Some(Utc::now());
            ReconcileCommit {
                before,
                after: convo.messages.len(),
            }
        };
        self.saves.schedule(Table::Conversations);
        commit
    }

    pub fn increment_unread(&self, correspondent: CorrespondentId) {
        {
            let mut map = self.lock();
            let convo = map.entry(correspondent).or_default();
            convo.unread_count = convo.unread_count.saturating_add(1);
        }
        self.saves.schedule(Table::Conversations);
    }

    /// Clear the unread counter, returning its previous value.
    pub fn mark_read(&self, correspondent: CorrespondentId) -> u32 {
        let previous = self
            .lock()
            .get_mut(&correspondent)
            .map(|convo| std::mem::take(&mut convo.unread_count))
            .unwrap_or(0);
        if previous > 0 {
            self.saves.schedule(Table::Conversations);
        }
        previous
    }

    /// Copy of one conversation.
    pub fn snapshot(&self, correspondent: CorrespondentId) -> Option<Conversation> {
        self.lock().get(&correspondent).cloned()
    }

    pub fn total_unread(&self) -> u64 {
        self.lock().values().map(|c| u64::from(c.unread_count)).sum()
    }

    /// Summaries of every conversation, ordered by correspondent id.
    pub fn summaries(&self) -> Vec<ConversationSummary> {
        let mut out: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, convo)| ConversationSummary {
                correspondent: *id,
                message_count: convo.messages.len(),
                unread_count: convo.unread_count,
                last_message_at: convo.messages.last().map(|m| m.timestamp),
                last_reconciled_at: convo.last_reconciled_at,
            })
            .collect();
        out.sort_by_key(|s| s.correspondent);
        out
    }

    /// Copy of the whole map in its persisted shape.
    pub fn export(&self) -> ConversationsDoc {
        self.lock()
            .iter()
            .map(|(id, convo)| (*id, convo.clone()))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrespondentId, Conversation>> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
