// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot token resolution.
//!
//! Priority:
//! 1. `discord.bot_token` from configuration (file or `DMRELAY_DISCORD_BOT_TOKEN`)
//! 2. The token saved in the config table
//! 3. Interactive TTY prompt via `rpassword`, saved for next time

use std::io::IsTerminal;

use dmrelay_config::model::DiscordConfig;
use dmrelay_core::DmRelayError;
use dmrelay_storage::{DurableStore, StoredSettings, Table};
use tracing::info;

/// Where the token in use came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Config,
    Stored,
    Prompt,
}

/// Pick a token without prompting.
pub fn configured_token(
    config: &DiscordConfig,
    stored: &StoredSettings,
) -> Option<(String, TokenSource)> {
    let usable = |t: &String| !t.trim().is_empty();
    if let Some(token) = config.bot_token.as_ref().filter(|t| usable(t)) {
        return Some((token.trim().to_string(), TokenSource::Config));
    }
    stored
        .token
        .as_ref()
        .filter(|t| usable(t))
        .map(|t| (t.trim().to_string(), TokenSource::Stored))
}

/// Resolve the token, prompting and saving it when nothing is configured.
pub fn resolve_token(
    config: &DiscordConfig,
    store: &DurableStore,
) -> Result<(String, TokenSource), DmRelayError> {
    let stored: StoredSettings = store.load_or_default(Table::Config);
    if let Some(found) = configured_token(config, &stored) {
        return Ok(found);
    }
    eprintln!("Missing bot token.");
    let token = prompt_token("Enter a valid bot token: ")?;
    save_token(store, &token)?;
    Ok((token, TokenSource::Prompt))
}

/// Read a token from the terminal without echoing it.
pub fn prompt_token(prompt: &str) -> Result<String, DmRelayError> {
    if !std::io::stdin().is_terminal() {
        return Err(DmRelayError::Config(
            "No bot token configured. Set DMRELAY_DISCORD_BOT_TOKEN or run `dmrelay config set-token` interactively."
                .into(),
        ));
    }
    loop {
        eprint!("{prompt}");
        let token = rpassword::read_password()
            .map_err(|e| DmRelayError::Config(format!("failed to read token: {e}")))?;
        let token = token.trim();
        if !token.is_empty() {
            return Ok(token.to_string());
        }
        eprintln!("Token cannot be empty.");
    }
}

/// Persist `token` in the config table, keeping the rest of the document.
pub fn save_token(store: &DurableStore, token: &str) -> Result<(), DmRelayError> {
    let mut settings: StoredSettings = store.load_or_default(Table::Config);
    settings.token = Some(token.trim().to_string());
    store.save_blocking(Table::Config, &settings)?;
    info!(path = %store.path(Table::Config).display(), "bot token saved");
    Ok(())
}
