// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the relay, storage and adapter crates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier of a remote user who exchanges direct messages with the bot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CorrespondentId(pub u64);

impl fmt::Display for CorrespondentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrespondentId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(CorrespondentId)
    }
}

/// Service-assigned message identifier, unique within one correspondent's stream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single direct message. Two messages are the same message when their ids match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// `true` when the bot account wrote it.
    pub author_is_self: bool,
    pub timestamp: DateTime<Utc>,
    pub body: String,
}

impl Message {
    /// A message written by the correspondent.
    pub fn inbound(id: u64, timestamp: DateTime<Utc>, body: impl Into<String>) -> Self {
        Self {
            id: MessageId(id),
            author_is_self: false,
            timestamp,
            body: body.into(),
        }
    }

    /// A message written by the bot account.
    pub fn outbound(id: u64, timestamp: DateTime<Utc>, body: impl Into<String>) -> Self {
        Self {
            id: MessageId(id),
            author_is_self: true,
            timestamp,
            body: body.into(),
        }
    }
}

/// Per-correspondent message log as held in memory and persisted on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Chronological message sequence.
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_reconciled_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Whether one of the last `window` messages has `id`.
    pub fn tail_contains(&self, id: MessageId, window: usize) -> bool {
        self.messages.iter().rev().take(window).any(|m| m.id == id)
    }
}

/// Phase of the reconciliation job.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Idle,
    Running,
    Completed,
    CompletedWithFailures,
}

impl JobPhase {
    /// Whether the phase ends a run.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::CompletedWithFailures)
    }
}

/// Progress of the most recent (or current) reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub phase: JobPhase,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl JobState {
    /// Correspondents of the current run that have not reported an outcome yet.
    pub fn outstanding(&self) -> usize {
        self.total.saturating_sub(self.completed + self.failed)
    }
}

/// Answer to a request for a new reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TriggerOutcome {
    Accepted,
    RejectedAlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correspondent_id_parses_and_displays() {
        let id: CorrespondentId = " 4242 ".parse().expect("should parse");
        assert_eq!(id, CorrespondentId(4242));
        assert_eq!(id.to_string(), "4242");
        assert!("not-a-number".parse::<CorrespondentId>().is_err());
    }

    #[test]
    fn conversation_map_round_trips_with_numeric_keys() {
        let mut map = std::collections::BTreeMap::new();
        let mut convo = Conversation::default();
        convo
            .messages
            .push(Message::inbound(7, Utc::now(), "hello"));
        convo.unread_count = 1;
        map.insert(CorrespondentId(99), convo.clone());

        let json = serde_json::to_string(&map).expect("should serialize");
        assert!(json.contains("\"99\""));
        let parsed: std::collections::BTreeMap<CorrespondentId, Conversation> =
            serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(parsed.get(&CorrespondentId(99)), Some(&convo));
    }

    #[test]
    fn job_phase_display_is_snake_case() {
        assert_eq!(JobPhase::CompletedWithFailures.to_string(), "completed_with_failures");
        assert!(JobPhase::Completed.is_terminal());
        assert!(!JobPhase::Running.is_terminal());
    }

    #[test]
    fn outstanding_never_underflows() {
        let state = JobState {
            total: 2,
            completed: 2,
            failed: 1,
            ..JobState::default()
        };
        assert_eq!(state.outstanding(), 0);
    }
}
