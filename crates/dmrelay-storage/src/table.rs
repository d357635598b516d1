// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logical tables kept by the durable store.

use strum::{Display, EnumString};

/// One independently saved document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Table {
    /// Bot token and other settings captured at runtime.
    Config,
    /// Every correspondent who has ever messaged the bot.
    Correspondents,
    /// Message logs keyed by correspondent.
    Conversations,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Config, Table::Correspondents, Table::Conversations];

    pub fn file_name(self) -> &'static str {
        match self {
            Table::Config => "config.json",
            Table::Correspondents => "correspondents.json",
            Table::Conversations => "conversations.json",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}
