//! Creates announcement obligations for broadcasts by the configured sender.

use tracing::{Instrument, error, info, instrument};

use crate::{
    base::{
        config::Config,
        types::{MessageEvent, Void, deadline_after},
    },
    service::{
        chat::ChatClient,
        db::{AnnouncementObligation, DbClient},
    },
};

use super::qualifier::{ANNOUNCEMENT_QUALIFIERS, QualifierContext, qualifies};

/// Handles a message that carries the broadcast marker.
///
/// It spawns a new task to handle the event asynchronously.
#[instrument(skip_all)]
pub fn handle_announcement_message(event: MessageEvent, config: Config, db: DbClient, chat: ChatClient) {
    tokio::spawn(
        async move {
            // Process the event.
            let result = process_announcement_message(&event, &config, &db, &chat).await;

            // Log any errors.
            if let Err(err) = &result {
                error!("Error while handling announcement message: {}", err);
            }
        }
        .in_current_span(),
    );
}

/// Records an announcement obligation, with the sender as its first responder.
#[instrument(skip_all, fields(channel_id = %event.channel_id, ts = %event.ts))]
pub async fn process_announcement_message(event: &MessageEvent, config: &Config, db: &DbClient, chat: &ChatClient) -> Void {
    let context = QualifierContext {
        config,
        bot_user_id: chat.bot_user_id(),
    };

    if !qualifies(ANNOUNCEMENT_QUALIFIERS, event, &context) {
        return Ok(());
    }

    // The sender qualifier guarantees this is the configured sender.
    let sender_id = config.announcement_sender_id.clone();

    let obligation = AnnouncementObligation {
        channel_id: event.channel_id.clone(),
        message_ts: event.ts.clone(),
        remind_time: deadline_after(&event.ts, config.announcement_response_window)?,
        responder_ids: vec![sender_id],
    };

    db.create_announcement_obligation(&obligation).await?;

    info!("Tracking announcement until {}.", obligation.remind_time);

    Ok(())
}
