//! Outbound notifications with per-call failure containment.
//!
//! Every method here swallows (and logs) the transport error of the single call
//! it makes, so one failed send never aborts the rest of a sweep batch.

use std::{collections::HashSet, time::Duration};

use tracing::{error, instrument, warn};

use crate::base::types::ChatMessage;

use super::chat::ChatClient;

/// Wraps the chat client for the calls the interaction layer makes.
///
/// This is trivially cloneable.
#[derive(Clone)]
pub struct Notifier {
    chat: ChatClient,
    pause: Duration,
}

impl Notifier {
    pub fn new(chat: ChatClient, pause: Duration) -> Self {
        Self { chat, pause }
    }

    /// Waits out the configured pause between two sends.
    pub async fn pause(&self) {
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
    }

    /// Reminds the outstanding mentioned users in the thread of the original message.
    ///
    /// Returns whether the reminder was delivered.
    #[instrument(skip(self))]
    pub async fn remind_mentioned_users(&self, channel_id: &str, message_ts: &str, user_ids: &[String]) -> bool {
        let text = mention_reminder_text(user_ids);

        match self.chat.post_message(channel_id, message_ts, &text).await {
            Ok(_) => true,
            Err(err) => {
                error!("Failed to send mention reminder to `{}`: {}", channel_id, err);
                false
            }
        }
    }

    /// Sends a direct reminder about an unacknowledged announcement.
    ///
    /// Returns whether the reminder was delivered.
    #[instrument(skip(self, permalink))]
    pub async fn remind_announcement_recipient(&self, user_id: &str, channel_id: &str, permalink: Option<&str>) -> bool {
        let text = announcement_reminder_text(channel_id, permalink);

        match self.chat.post_message(user_id, "", &text).await {
            Ok(_) => true,
            Err(err) => {
                error!("Failed to send announcement reminder to `{}`: {}", user_id, err);
                false
            }
        }
    }

    /// Looks up a permalink, or `None` if the lookup failed.
    #[instrument(skip(self))]
    pub async fn permalink(&self, channel_id: &str, ts: &str) -> Option<String> {
        match self.chat.get_permalink(channel_id, ts).await {
            Ok(link) => Some(link),
            Err(err) => {
                warn!("Failed to get permalink for `{}` / `{}`: {}", channel_id, ts, err);
                None
            }
        }
    }

    /// Fetches the current roster of non-bot users, or `None` if the lookup failed.
    #[instrument(skip(self))]
    pub async fn roster(&self) -> Option<HashSet<String>> {
        match self.chat.list_non_bot_users().await {
            Ok(users) => Some(users),
            Err(err) => {
                error!("Failed to list workspace users: {}", err);
                None
            }
        }
    }

    /// Looks up the message at `ts`, or `None` if there is none or the lookup failed.
    #[instrument(skip(self))]
    pub async fn message_at(&self, channel_id: &str, ts: &str) -> Option<ChatMessage> {
        match self.chat.fetch_message_at(channel_id, ts, true).await {
            Ok(message) => message,
            Err(err) => {
                warn!("Failed to fetch message `{}` in `{}`: {}", ts, channel_id, err);
                None
            }
        }
    }
}

// Helpers.

/// Text of the reminder posted to a mention's thread.
pub fn mention_reminder_text(user_ids: &[String]) -> String {
    let mentions = user_ids.iter().map(|id| format!("<@{id}>")).collect::<Vec<_>>().join(" ");

    format!("{mentions} :wave: Friendly reminder: you were mentioned in the message above. Please acknowledge it with a reaction.")
}

/// Text of the direct reminder about an announcement.
pub fn announcement_reminder_text(channel_id: &str, permalink: Option<&str>) -> String {
    match permalink {
        Some(link) => format!(":wave: Friendly reminder: please acknowledge this announcement with a reaction: {link}"),
        None => format!(":wave: Friendly reminder: please acknowledge the latest announcement in <#{channel_id}> with a reaction."),
    }
}

// Tests.
