// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::DmRelayConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every problem instead of stopping at the first one.
pub fn validate_config(config: &DmRelayConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.agent.log_level.to_ascii_lowercase().as_str()) {
        fail(format!(
            "agent.log_level `{}` is not one of {}",
            config.agent.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if let Some(token) = &config.discord.bot_token
        && token.trim().is_empty()
    {
        fail("discord.bot_token must not be blank when set".to_string());
    }

    if config.history.fetch_limit == 0 {
        fail("history.fetch_limit must be at least 1".to_string());
    }

    if config.history.concurrency == 0 {
        fail("history.concurrency must be at least 1".to_string());
    }

    if config.history.fetch_timeout_secs == 0 {
        fail("history.fetch_timeout_secs must be at least 1".to_string());
    }

    if config.history.dedup_window == 0 {
        fail("history.dedup_window must be at least 1".to_string());
    }

    if config.storage.data_dir.trim().is_empty() {
        fail("storage.data_dir must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
