//! Resolves obligations when users react to the tracked messages.

use tracing::{Instrument, debug, error, info, instrument};

use crate::{
    base::{
        config::Config,
        types::{ChatMessage, ReactionAddedEvent, Void},
    },
    service::{chat::ChatClient, db::DbClient, notifier::Notifier},
};

use super::router::{has_broadcast_marker, has_mention};

/// Which obligation kinds a reacted-to message may carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub mention: bool,
    pub announcement: bool,
}

/// Classifies a reacted-to message.
///
/// A message can be both a mention and an announcement; each path is applied on its own.
pub fn classify(message: &ChatMessage, channel_id: &str, config: &Config) -> Classification {
    let mention = config.mention_tracking_enabled && has_mention(&message.text);

    let announcement = config.announcement_tracking_enabled
        && has_broadcast_marker(&message.text, config)
        && message.user_id.as_deref() == Some(config.announcement_sender_id.as_str())
        && channel_id == config.announcement_channel_id;

    Classification { mention, announcement }
}

/// Whether the fetched message is the one the reaction was added to.
pub fn is_reacted_message(message: &ChatMessage, event: &ReactionAddedEvent) -> bool {
    message.ts == event.message_ts
}

/// Handles a reaction-added event.
///
/// It spawns a new task to handle the event asynchronously.
#[instrument(skip_all)]
pub fn handle_reaction_added(event: ReactionAddedEvent, config: Config, db: DbClient, chat: ChatClient) {
    tokio::spawn(
        async move {
            // Process the event.
            let result = process_reaction_added(&event, &config, &db, &chat).await;

            // Log any errors.
            if let Err(err) = &result {
                error!("Error while handling reaction: {}", err);
            }
        }
        .in_current_span(),
    );
}

/// Records a reaction as an acknowledgment of whatever obligation the message carries.
///
/// The reacted-to message is looked up first; if the lookup fails, or the message
/// carries no obligation, the reaction is dropped without touching the store.
#[instrument(skip_all, fields(channel_id = %event.channel_id, ts = %event.message_ts, user_id = %event.reactor_id))]
pub async fn process_reaction_added(event: &ReactionAddedEvent, config: &Config, db: &DbClient, chat: &ChatClient) -> Void {
    let notifier = Notifier::new(chat.clone(), config.notification_pause);

    let Some(message) = notifier.message_at(&event.channel_id, &event.message_ts).await else {
        debug!("Reacted-to message not found; dropping reaction.");
        return Ok(());
    };

    // History returns the closest earlier message when the reacted-to one is gone or is a thread reply.
    if !is_reacted_message(&message, event) {
        debug!("History returned `{}` instead of the reacted-to message; classifying that one.", message.ts);
    }

    let classification = classify(&message, &event.channel_id, config);

    if classification == Classification::default() {
        debug!("Reacted-to message is not tracked; dropping reaction.");
        return Ok(());
    }

    if classification.mention {
        db.remove_mention_nonresponder(&event.channel_id, &event.message_ts, &event.reactor_id).await?;
        info!("Recorded :{}: as a mention acknowledgment.", event.reaction);
    }

    if classification.announcement {
        db.add_announcement_responder(&event.channel_id, &event.message_ts, &event.reactor_id).await?;
        info!("Recorded :{}: as an announcement acknowledgment.", event.reaction);
    }

    Ok(())
}

// Tests.
