// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document shapes of the persisted tables.

use std::collections::BTreeMap;

use dmrelay_core::{Conversation, CorrespondentId};
use serde::{Deserialize, Serialize};

/// Contents of `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSettings {
    /// Bot token entered interactively or via `config set-token`.
    #[serde(default)]
    pub token: Option<String>,
}

/// Contents of `correspondents.json`, sorted ascending.
pub type CorrespondentsDoc = Vec<CorrespondentId>;

/// Contents of `conversations.json`.
pub type ConversationsDoc = BTreeMap<CorrespondentId, Conversation>;
