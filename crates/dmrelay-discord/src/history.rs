// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST side of the adapter: DM history fetches and outgoing messages.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dmrelay_core::{CorrespondentId, DmRelayError, HistorySource, Message, MessageSender};
use serenity::builder::GetMessages;
use serenity::http::Http;
use serenity::model::channel::Message as DiscordMessage;
use serenity::model::id::{ChannelId, MessageId, UserId};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Discord returns at most this many messages per history request.
pub const PAGE_SIZE: usize = 100;

/// Discord rejects message bodies longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Pages backwards through a correspondent's DM channel.
pub struct DiscordHistory {
    http: Arc<Http>,
}

impl DiscordHistory {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HistorySource for DiscordHistory {
    async fn fetch_history(
        &self,
        correspondent: CorrespondentId,
        limit: usize,
        cancel: CancellationToken,
    ) -> Result<Vec<Message>, DmRelayError> {
        let channel = dm_channel(&self.http, correspondent).await?;

        // Newest first while paging.
        let mut collected: Vec<Message> = Vec::new();
        let mut before: Option<MessageId> = None;
        while collected.len() < limit {
            if cancel.is_cancelled() {
                return Err(DmRelayError::Transient {
                    message: format!("history fetch for {correspondent} cancelled"),
                    source: None,
                });
            }
            let want = page_len(limit - collected.len());
            let mut request = GetMessages::new().limit(want);
            if let Some(before) = before {
                request = request.before(before);
            }
            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => continue,
                page = channel.messages(self.http.as_ref(), request) => page.map_err(fetch_error)?,
            };
            let exhausted = page.len() < usize::from(want);
            before = page.last().map(|m| m.id);
            // A DM channel has two participants; whoever is not the correspondent is us.
            collected.extend(
                page.iter()
                    .map(|m| convert(m, m.author.id.get() != correspondent.0)),
            );
            debug!(%correspondent, fetched = collected.len(), "history page received");
            if exhausted || before.is_none() {
                break;
            }
        }

        collected.truncate(limit);
        collected.reverse();
        Ok(collected)
    }
}

/// Sends plain-text DMs.
pub struct DiscordSender {
    http: Arc<Http>,
}

impl DiscordSender {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MessageSender for DiscordSender {
    async fn send_direct(
        &self,
        correspondent: CorrespondentId,
        body: &str,
    ) -> Result<Message, DmRelayError> {
        check_length(body)?;
        let channel = dm_channel(&self.http, correspondent)
            .await
            .map_err(|e| DmRelayError::Channel {
                message: format!("cannot open DM with {correspondent}: {e}"),
                source: Some(Box::new(e)),
            })?;
        let sent = channel
            .say(self.http.as_ref(), body)
            .await
            .map_err(|e| DmRelayError::Channel {
                message: format!("failed to send message to {correspondent}: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(convert(&sent, true))
    }
}

async fn dm_channel(http: &Http, correspondent: CorrespondentId) -> Result<ChannelId, DmRelayError> {
    if correspondent.0 == 0 {
        return Err(DmRelayError::Auth {
            message: "user id 0 is not a valid Discord user".into(),
        });
    }
    let channel = UserId::new(correspondent.0)
        .create_dm_channel(http)
        .await
        .map_err(fetch_error)?;
    Ok(channel.id)
}

/// Convert a Discord message into the relay's shape.
pub fn convert(message: &DiscordMessage, author_is_self: bool) -> Message {
    Message {
        id: dmrelay_core::MessageId(message.id.get()),
        author_is_self,
        timestamp: to_utc(
            &message.timestamp.to_string(),
            message.timestamp.unix_timestamp(),
        ),
        body: message.content.clone(),
    }
}

/// Parse Discord's RFC 3339 timestamp, keeping its milliseconds. Falls back
/// to whole seconds if the text does not parse.
fn to_utc(rfc3339: &str, unix_secs: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::from_timestamp(unix_secs, 0).unwrap_or_default())
}

/// Size of the next page when `remaining` messages are still wanted.
pub fn page_len(remaining: usize) -> u8 {
    // PAGE_SIZE fits in a u8.
    remaining.clamp(1, PAGE_SIZE) as u8
}

pub fn check_length(body: &str) -> Result<(), DmRelayError> {
    let chars = body.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(DmRelayError::Channel {
            message: format!("message is {chars} characters, Discord allows {MAX_MESSAGE_CHARS}"),
            source: None,
        });
    }
    Ok(())
}

/// 401 and 403 mean the token or this correspondent is off limits; anything
/// else may succeed on a later run.
pub fn classify_status(status: Option<u16>, detail: String) -> DmRelayError {
    match status {
        Some(401 | 403) => DmRelayError::Auth { message: detail },
        _ => DmRelayError::Transient {
            message: detail,
            source: None,
        },
    }
}

fn fetch_error(e: serenity::Error) -> DmRelayError {
    let status = match &e {
        serenity::Error::Http(http) => http.status_code().map(|s| s.as_u16()),
        _ => None,
    };
    match classify_status(status, e.to_string()) {
        DmRelayError::Transient { message, .. } => DmRelayError::Transient {
            message,
            source: Some(Box::new(e)),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_capped_at_discord_maximum() {
        assert_eq!(page_len(1000), 100);
        assert_eq!(page_len(100), 100);
        assert_eq!(page_len(37), 37);
        assert_eq!(page_len(0), 1);
    }

    #[test]
    fn forbidden_and_unauthorized_are_auth_errors() {
        assert!(matches!(
            classify_status(Some(403), "blocked".into()),
            DmRelayError::Auth { .. }
        ));
        assert!(matches!(
            classify_status(Some(401), "bad token".into()),
            DmRelayError::Auth { .. }
        ));
    }

    #[test]
    fn other_failures_are_transient() {
        for status in [Some(429), Some(500), Some(502), None] {
            let err = classify_status(status, "hiccup".into());
            assert!(err.is_retryable(), "{status:?} should be retryable");
        }
    }

    #[test]
    fn overlong_bodies_are_rejected() {
        assert!(check_length(&"a".repeat(MAX_MESSAGE_CHARS)).is_ok());
        let err = check_length(&"a".repeat(MAX_MESSAGE_CHARS + 1)).unwrap_err();
        assert!(matches!(err, DmRelayError::Channel { .. }));
    }

    #[test]
    fn timestamps_keep_milliseconds() {
        let t = to_utc("2023-11-14T22:13:20.123Z", 0);
        assert_eq!(t.timestamp(), 1_700_000_000);
        assert_eq!(t.timestamp_subsec_millis(), 123);
        assert_eq!(t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true), "2023-11-14T22:13:20.123Z");

        let offset = to_utc("2023-11-14T23:13:20.900+01:00", 0);
        assert_eq!(offset.timestamp_subsec_millis(), 900);
        assert!(t < offset);
    }

    #[test]
    fn same_second_messages_stay_ordered() {
        let earlier = to_utc("2024-01-02T12:00:00.100Z", 0);
        let later = to_utc("2024-01-02T12:00:00.900Z", 0);
        assert!(earlier < later);
    }

    #[test]
    fn unparseable_timestamps_fall_back_to_seconds() {
        assert_eq!(to_utc("not a time", 1_700_000_000).timestamp(), 1_700_000_000);
    }
}
