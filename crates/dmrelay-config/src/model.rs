// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model.
//!
//! Every struct uses `#[serde(deny_unknown_fields)]` so a misspelled key is
//! reported at startup instead of being silently ignored.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level dmrelay configuration. All sections are optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DmRelayConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    /// Discord bot settings.
    #[serde(default)]
    pub discord: DiscordConfig,

    /// History reconciliation tunables.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Durable store location and write coalescing.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Process identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs and the shell banner.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "dmrelay".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Discord bot configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DiscordConfig {
    /// Bot token. Takes precedence over the token saved in the config table.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// User IDs whose DMs are relayed. Empty relays everyone.
    #[serde(default)]
    pub allowed_users: Vec<u64>,
}

/// History reconciliation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// Maximum number of messages requested per correspondent.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,

    /// Number of history fetches allowed in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Deadline for a whole reconciliation run, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Start a reconciliation run as soon as the bot connects.
    #[serde(default)]
    pub reconcile_on_startup: bool,

    /// How many trailing message ids a live append is checked against.
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,
}

impl HistoryConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            fetch_limit: default_fetch_limit(),
            concurrency: default_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            reconcile_on_startup: false,
            dedup_window: default_dedup_window(),
        }
    }
}

fn default_fetch_limit() -> usize {
    1000
}

fn default_concurrency() -> usize {
    4
}

fn default_fetch_timeout_secs() -> u64 {
    120
}

fn default_dedup_window() -> usize {
    64
}

/// Durable store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding `config.json`, `correspondents.json` and `conversations.json`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Coalescing window for debounced saves, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl StorageConfig {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("dmrelay"))
        .unwrap_or_else(|| PathBuf::from("./dmrelay-data"))
        .to_string_lossy()
        .to_string()
}

fn default_debounce_ms() -> u64 {
    500
}
