// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `dmrelay status` command implementation.
//!
//! Summarises the durable tables without connecting to Discord. Reads only;
//! an unreadable table is reported, never moved aside.

use std::io::IsTerminal;

use chrono::{DateTime, Utc};
use dmrelay_config::DmRelayConfig;
use dmrelay_core::DmRelayError;
use dmrelay_storage::{ConversationsDoc, CorrespondentsDoc, DurableStore, StoredSettings, Table};
use serde::Serialize;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub data_dir: String,
    pub token_stored: bool,
    pub correspondents: usize,
    pub conversations: usize,
    pub messages: usize,
    pub unread: u64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_reconciled_at: Option<DateTime<Utc>>,
    /// Tables that exist but could not be decoded.
    pub corrupt_tables: Vec<String>,
}

impl StatusReport {
    pub fn collect(store: &DurableStore) -> Result<Self, DmRelayError> {
        let mut corrupt_tables = Vec::new();
        let settings: StoredSettings = read(store, Table::Config, &mut corrupt_tables)?;
        let correspondents: CorrespondentsDoc =
            read(store, Table::Correspondents, &mut corrupt_tables)?;
        let conversations: ConversationsDoc =
            read(store, Table::Conversations, &mut corrupt_tables)?;

        let all = conversations.values();
        Ok(Self {
            data_dir: store.root().display().to_string(),
            token_stored: settings.token.is_some_and(|t| !t.trim().is_empty()),
            correspondents: correspondents.len(),
            conversations: conversations.len(),
            messages: all.clone().map(|c| c.messages.len()).sum(),
            unread: all.clone().map(|c| u64::from(c.unread_count)).sum(),
            last_message_at: all
                .clone()
                .filter_map(|c| c.messages.last().map(|m| m.timestamp))
                .max(),
            last_reconciled_at: all.filter_map(|c| c.last_reconciled_at).max(),
            corrupt_tables,
        })
    }
}

fn read<T: serde::de::DeserializeOwned + Default>(
    store: &DurableStore,
    table: Table,
    corrupt: &mut Vec<String>,
) -> Result<T, DmRelayError> {
    match store.load(table) {
        Ok(value) => Ok(value.unwrap_or_default()),
        Err(DmRelayError::CorruptData { .. }) => {
            corrupt.push(table.to_string());
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}

/// Run the `dmrelay status` command.
pub fn run_status(config: &DmRelayConfig, json: bool, plain: bool) -> Result<(), DmRelayError> {
    let store = DurableStore::open(config.storage.data_path())?;
    let report = StatusReport::collect(&store)?;

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| DmRelayError::Internal(format!("failed to encode status: {e}")))?;
        println!("{out}");
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_report(&config.agent.name, &report, use_color);
    }
    Ok(())
}

fn print_report(name: &str, report: &StatusReport, use_color: bool) {
    let never = || "never".to_string();
    let fmt_time = |t: Option<DateTime<Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(never)
    };

    println!();
    println!("  {name} status");
    println!("  {}", "-".repeat(35));
    println!("    Data dir:       {}", report.data_dir);
    let token = match (report.token_stored, use_color) {
        (true, true) => {
            use colored::Colorize;
            format!("{} saved", "✓".green())
        }
        (false, true) => {
            use colored::Colorize;
            format!("{} not saved", "✗".red())
        }
        (true, false) => "[OK] saved".to_string(),
        (false, false) => "[--] not saved".to_string(),
    };
    println!("    Token:          {token}");
    println!("    Correspondents: {}", report.correspondents);
    println!(
        "    Messages:       {} in {} conversations",
        report.messages, report.conversations
    );
    println!("    Unread:         {}", report.unread);
    println!("    Last message:   {}", fmt_time(report.last_message_at));
    println!("    Last reload:    {}", fmt_time(report.last_reconciled_at));
    for table in &report.corrupt_tables {
        println!("    Warning:        {table} table is unreadable");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmrelay_core::{Conversation, CorrespondentId, Message};
    use dmrelay_test_utils::ts;

    #[test]
    fn empty_store_reports_zeroes() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        let report = StatusReport::collect(&store).unwrap();
        assert!(!report.token_stored);
        assert_eq!(report.messages, 0);
        assert!(report.last_message_at.is_none());
        assert!(report.corrupt_tables.is_empty());
    }

    #[test]
    fn counts_messages_and_unread_across_conversations() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();

        let mut doc = ConversationsDoc::new();
        for (id, unread) in [(1u64, 2u32), (2, 0)] {
            let conversation = Conversation {
                messages: vec![
                    Message::inbound(10, ts(id as i64), "a"),
                    Message::outbound(11, ts(10 + id as i64), "b"),
                ],
                unread_count: unread,
                last_reconciled_at: None,
            };
            doc.insert(CorrespondentId(id), conversation);
        }
        store.save_blocking(Table::Conversations, &doc).unwrap();
        store
            .save_blocking(Table::Correspondents, &vec![CorrespondentId(1), CorrespondentId(2)])
            .unwrap();

        let report = StatusReport::collect(&store).unwrap();
        assert_eq!(report.correspondents, 2);
        assert_eq!(report.conversations, 2);
        assert_eq!(report.messages, 4);
        assert_eq!(report.unread, 2);
        assert_eq!(report.last_message_at, Some(ts(12)));
    }

    #[test]
    fn corrupt_table_is_reported_and_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        std::fs::write(store.path(Table::Config), b"{{").unwrap();

        let report = StatusReport::collect(&store).unwrap();
        assert_eq!(report.corrupt_tables, vec!["config".to_string()]);
        assert!(store.path(Table::Config).exists());

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"token_stored\":false"));
    }
}
