// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discord adapter for dmrelay.
//!
//! Implements the relay's remote collaborators over serenity: [`DiscordHistory`]
//! pages through DM channels, [`DiscordSender`] sends replies, and the gateway
//! [`Handler`] feeds live direct messages into the [`Relay`].

pub mod handler;
pub mod history;

use std::sync::Arc;

use dmrelay_agent::Relay;
use dmrelay_config::model::DiscordConfig;
use dmrelay_core::DmRelayError;
use serenity::Client;
use serenity::http::Http;
use serenity::model::gateway::GatewayIntents;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use handler::{Handler, should_relay};
pub use history::{DiscordHistory, DiscordSender};

/// Connection to Discord for one bot token.
pub struct DiscordChannel {
    token: String,
    http: Arc<Http>,
}

impl DiscordChannel {
    /// Requires a non-empty bot token.
    pub fn new(token: &str) -> Result<Self, DmRelayError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(DmRelayError::Config("discord bot token cannot be empty".into()));
        }
        Ok(Self {
            token: token.to_string(),
            http: Arc::new(Http::new(token)),
        })
    }

    pub fn history(&self) -> Arc<DiscordHistory> {
        Arc::new(DiscordHistory::new(Arc::clone(&self.http)))
    }

    pub fn sender(&self) -> Arc<DiscordSender> {
        Arc::new(DiscordSender::new(Arc::clone(&self.http)))
    }

    pub fn intents() -> GatewayIntents {
        GatewayIntents::DIRECT_MESSAGES | GatewayIntents::MESSAGE_CONTENT
    }

    /// Run the gateway until `shutdown` is cancelled or the connection fails.
    pub async fn run(
        &self,
        relay: Arc<Relay>,
        config: &DiscordConfig,
        reconcile_on_startup: bool,
        shutdown: CancellationToken,
    ) -> Result<(), DmRelayError> {
        let handler = Handler::new(
            Arc::clone(&relay),
            config.allowed_users.clone(),
            reconcile_on_startup,
        );
        let mut client = Client::builder(&self.token, Self::intents())
            .event_handler(handler)
            .await
            .map_err(|e| DmRelayError::Channel {
                message: format!("failed to build discord client: {e}"),
                source: Some(Box::new(e)),
            })?;

        info!("connecting to discord gateway");
        relay.set_connection_status("Connecting");
        let shard_manager = Arc::clone(&client.shard_manager);

        let result = tokio::select! {
            result = client.start() => result,
            _ = shutdown.cancelled() => {
                debug!("stopping discord shards");
                shard_manager.shutdown_all().await;
                Ok(())
            }
        };
        relay.set_connection_status("Disconnected");

        result.map_err(gateway_error)
    }
}

fn gateway_error(e: serenity::Error) -> DmRelayError {
    match e {
        serenity::Error::Gateway(serenity::gateway::GatewayError::InvalidAuthentication) => {
            DmRelayError::Auth {
                message: "discord rejected the bot token".into(),
            }
        }
        other => DmRelayError::Channel {
            message: format!("discord gateway error: {other}"),
            source: Some(Box::new(other)),
        },
    }
}
