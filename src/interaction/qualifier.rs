//! Predicates that decide whether an inbound message is eligible for tracking.
//!
//! Qualifiers never touch the store.  A chain is evaluated in order and stops at
//! the first failing qualifier; a message that fails is silently dropped.

use tracing::{debug, instrument, warn};

use crate::{base::config::Config, base::types::MessageEvent, service::chat::ChatClient};

/// Slack's built-in bot, which the API does not flag as a bot.
pub const SLACKBOT_USER_ID: &str = "USLACKBOT";

/// What a qualifier may consult besides the event itself.
#[derive(Clone, Copy)]
pub struct QualifierContext<'a> {
    pub config: &'a Config,
    pub bot_user_id: &'a str,
}

/// A single message qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    /// The message has no subtype (no edits, joins, integration posts, ...).
    SimpleChannelMessage,
    /// The message was not posted by a bot, including this one.
    NonBotAuthor,
    /// The message was posted by the configured announcement sender.
    FromConfiguredSender,
    /// The message was posted in the configured announcement channel.
    InConfiguredChannel,
}

/// Qualifiers for the mention route.
pub const MENTION_QUALIFIERS: &[Qualifier] = &[Qualifier::SimpleChannelMessage, Qualifier::NonBotAuthor];

/// Qualifiers for the announcement route.
pub const ANNOUNCEMENT_QUALIFIERS: &[Qualifier] = &[
    Qualifier::SimpleChannelMessage,
    Qualifier::NonBotAuthor,
    Qualifier::FromConfiguredSender,
    Qualifier::InConfiguredChannel,
];

impl Qualifier {
    /// Evaluates this qualifier against a message.
    pub fn check(&self, event: &MessageEvent, context: &QualifierContext<'_>) -> bool {
        match self {
            Qualifier::SimpleChannelMessage => event.subtype.is_none(),
            Qualifier::NonBotAuthor => event.bot_id.is_none() && event.user_id.as_deref().is_some_and(|user| user != context.bot_user_id),
            Qualifier::FromConfiguredSender => event.user_id.as_deref() == Some(context.config.announcement_sender_id.as_str()),
            Qualifier::InConfiguredChannel => event.channel_id == context.config.announcement_channel_id,
        }
    }
}

/// Evaluates a chain of qualifiers, short-circuiting on the first failure.
pub fn qualifies(chain: &[Qualifier], event: &MessageEvent, context: &QualifierContext<'_>) -> bool {
    chain.iter().all(|qualifier| {
        let passed = qualifier.check(event, context);

        if !passed {
            debug!("Message `{}` in `{}` failed qualifier {:?}.", event.ts, event.channel_id, qualifier);
        }

        passed
    })
}

/// Whether a user ID resolves to a human.
///
/// Any failure to resolve the user counts as "not a human", so unresolvable IDs
/// are never tracked.
#[instrument(skip(chat))]
pub async fn is_non_bot_user(chat: &ChatClient, user_id: &str) -> bool {
    if user_id == SLACKBOT_USER_ID {
        return false;
    }

    match chat.resolve_user(user_id).await {
        Ok(user) => {
            if user.is_bot {
                debug!("User `{}` ({}) is a bot.", user_id, user.name);
            }

            !user.is_bot
        }
        Err(err) => {
            warn!("Failed to resolve user `{}`: {}", user_id, err);
            false
        }
    }
}

// Tests.
