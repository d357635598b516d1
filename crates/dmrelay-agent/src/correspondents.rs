// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The grow-only set of correspondents, persisted apart from message bodies.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use dmrelay_core::CorrespondentId;
use dmrelay_storage::{CorrespondentsDoc, SaveHandle, Table};

pub struct CorrespondentSet {
    ids: Mutex<BTreeSet<CorrespondentId>>,
    saves: SaveHandle,
}

impl CorrespondentSet {
    pub fn new(saves: SaveHandle) -> Self {
        Self::restore(CorrespondentsDoc::new(), saves)
    }

    pub fn restore(doc: CorrespondentsDoc, saves: SaveHandle) -> Self {
        Self {
            ids: Mutex::new(doc.into_iter().collect()),
            saves,
        }
    }

    /// Record `id`. Returns `true` the first time it is seen.
    pub fn add(&self, id: CorrespondentId) -> bool {
        let inserted = self.lock().insert(id);
        if inserted {
            self.saves.schedule(Table::Correspondents);
        }
        inserted
    }

    pub fn contains(&self, id: CorrespondentId) -> bool {
        self.lock().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted copy, detached from later growth.
    pub fn snapshot(&self) -> CorrespondentsDoc {
        self.lock().iter().copied().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<CorrespondentId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
