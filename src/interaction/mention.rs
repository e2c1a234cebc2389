//! Creates mention obligations for messages that mention users.

use std::collections::BTreeSet;

use futures::future::join_all;
use tracing::{Instrument, debug, error, info, instrument};

use crate::{
    base::{
        config::Config,
        types::{MessageEvent, Void, deadline_after},
    },
    service::{
        chat::ChatClient,
        db::{DbClient, MentionObligation},
    },
};

use super::{
    qualifier::{MENTION_QUALIFIERS, QualifierContext, is_non_bot_user, qualifies},
    router::mention_pattern,
};

/// Handles a message that mentions users.
///
/// It spawns a new task to handle the event asynchronously.
#[instrument(skip_all)]
pub fn handle_mention_message(event: MessageEvent, config: Config, db: DbClient, chat: ChatClient) {
    tokio::spawn(
        async move {
            // Process the event.
            let result = process_mention_message(&event, &config, &db, &chat).await;

            // Log any errors.
            if let Err(err) = &result {
                error!("Error while handling mention message: {}", err);
            }
        }
        .in_current_span(),
    );
}

/// Records one mention obligation for the human users a message mentions.
///
/// Bots and users that cannot be resolved are left out.  Every lookup finishes
/// before anything is written, so a partial obligation is never stored.
#[instrument(skip_all, fields(channel_id = %event.channel_id, ts = %event.ts))]
pub async fn process_mention_message(event: &MessageEvent, config: &Config, db: &DbClient, chat: &ChatClient) -> Void {
    let context = QualifierContext {
        config,
        bot_user_id: chat.bot_user_id(),
    };

    if !qualifies(MENTION_QUALIFIERS, event, &context) {
        return Ok(());
    }

    let candidates = extract_mentioned_user_ids(&event.text);

    // Resolve every candidate concurrently; `join_all` keeps the (sorted) order.
    let checks = candidates.into_iter().map(|user_id| async move {
        let keep = is_non_bot_user(chat, &user_id).await;
        (user_id, keep)
    });

    let nonresponder_ids = join_all(checks).await.into_iter().filter_map(|(user_id, keep)| keep.then_some(user_id)).collect::<Vec<_>>();

    if nonresponder_ids.is_empty() {
        debug!("No human users mentioned; nothing to track.");
        return Ok(());
    }

    let obligation = MentionObligation {
        channel_id: event.channel_id.clone(),
        message_ts: event.ts.clone(),
        remind_time: deadline_after(&event.ts, config.mention_response_window)?,
        nonresponder_ids,
    };

    db.create_mention_obligation(&obligation).await?;

    info!("Tracking mention of {} user(s) until {}.", obligation.nonresponder_ids.len(), obligation.remind_time);

    Ok(())
}

/// The distinct user IDs mentioned in `text`.
pub fn extract_mentioned_user_ids(text: &str) -> BTreeSet<String> {
    mention_pattern().captures_iter(text).filter_map(|captures| captures.get(1)).map(|id| id.as_str().to_string()).collect()
}

// Tests.
