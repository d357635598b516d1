// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway events: connection status and live DM ingestion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dmrelay_agent::Relay;
use dmrelay_core::{CorrespondentId, TriggerOutcome};
use serenity::client::{Context, EventHandler};
use serenity::model::channel::Message as DiscordMessage;
use serenity::model::gateway::Ready;
use tracing::{debug, info};

use crate::history::convert;

/// Whether a gateway message should reach the relay.
///
/// Only direct messages from humans pass. When `allowed_users` is non-empty,
/// the author must also be listed there.
pub fn should_relay(author_is_bot: bool, in_guild: bool, author: u64, allowed_users: &[u64]) -> bool {
    if author_is_bot || in_guild {
        return false;
    }
    allowed_users.is_empty() || allowed_users.contains(&author)
}

/// Feeds gateway events into the relay.
pub struct Handler {
    relay: Arc<Relay>,
    allowed_users: Arc<Vec<u64>>,
    reconcile_on_startup: bool,
    reconciled_once: AtomicBool,
}

impl Handler {
    pub fn new(relay: Arc<Relay>, allowed_users: Vec<u64>, reconcile_on_startup: bool) -> Self {
        Self {
            relay,
            allowed_users: Arc::new(allowed_users),
            reconcile_on_startup,
            reconciled_once: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, "discord gateway ready");
        self.relay
            .set_connection_status(format!("Connected as {}", ready.user.name));

        // Reconnects fire `ready` again; only the first one starts a run.
        if self.reconcile_on_startup && !self.reconciled_once.swap(true, Ordering::SeqCst) {
            match self.relay.trigger_reconciliation() {
                TriggerOutcome::Accepted => info!("startup reconciliation started"),
                TriggerOutcome::RejectedAlreadyRunning => {
                    debug!("startup reconciliation skipped, run in progress")
                }
            }
        }
    }

    async fn message(&self, _ctx: Context, msg: DiscordMessage) {
        let author = msg.author.id.get();
        if !should_relay(
            msg.author.bot,
            msg.guild_id.is_some(),
            author,
            &self.allowed_users,
        ) {
            debug!(author, "ignoring message outside relayed DMs");
            return;
        }

        let correspondent = CorrespondentId(author);
        if self.relay.ingest_live(correspondent, convert(&msg, false)) {
            info!(%correspondent, "direct message received");
        } else {
            debug!(%correspondent, id = msg.id.get(), "redelivered direct message ignored");
        }
    }
}
