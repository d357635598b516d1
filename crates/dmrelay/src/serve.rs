// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `dmrelay serve` command implementation.
//!
//! Restores the relay from the data directory, connects to Discord and relays
//! direct messages until SIGINT or SIGTERM, then flushes every pending save.

use std::sync::Arc;

use dmrelay_agent::shutdown;
use dmrelay_agent::{Relay, RelayOptions};
use dmrelay_config::DmRelayConfig;
use dmrelay_core::DmRelayError;
use dmrelay_discord::DiscordChannel;
use dmrelay_storage::DurableStore;
use tracing::{debug, info};

use crate::token::resolve_token;

/// Runs the `dmrelay serve` command.
pub async fn run_serve(config: DmRelayConfig) -> Result<(), DmRelayError> {
    init_tracing(&config.agent.log_level);
    info!(agent = %config.agent.name, "starting dmrelay serve");

    let (relay, discord) = start_relay(&config)?;
    let shutdown = shutdown::install_signal_handler();

    let result = discord
        .run(
            Arc::clone(&relay),
            &config.discord,
            config.history.reconcile_on_startup,
            shutdown.clone(),
        )
        .await;

    shutdown.cancel();
    relay.shutdown().await;
    result
}

/// Open the data directory, resolve the token and restore the relay.
///
/// Must be called inside the tokio runtime.
pub(crate) fn start_relay(
    config: &DmRelayConfig,
) -> Result<(Arc<Relay>, DiscordChannel), DmRelayError> {
    let store = DurableStore::open(config.storage.data_path())?;
    let (token, source) = resolve_token(&config.discord, &store)?;
    debug!(?source, "bot token resolved");

    let discord = DiscordChannel::new(&token)?;
    let relay = Relay::restore(
        store,
        RelayOptions::from_config(config),
        discord.history(),
        discord.sender(),
    );
    Ok((Arc::new(relay), discord))
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub(crate) fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dmrelay={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
