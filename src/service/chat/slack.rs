//! Chat service integration for nag-bot.
//!
//! This module provides functionality for interacting with Slack:
//! - Receiving message and reaction events over socket mode
//! - Posting reminders and direct messages
//! - Looking up history, users, and permalinks
//!
//! It implements the `GenericChatClient` trait on top of `slack-morphism`.

use std::{collections::HashSet, ops::Deref, sync::Arc};

use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{ChatMessage, MessageEvent, MessageRef, ReactionAddedEvent, Res, UserInfo, Void},
    },
    interaction::{self, qualifier::SLACKBOT_USER_ID},
    service::db::DbClient,
};

use super::{ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

/// Page size for `users.list`.
const USERS_LIST_PAGE_SIZE: u16 = 200;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config, db: DbClient) -> Res<Self> {
        let client = SlackChatClient::new(config, db).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

impl From<SlackChatClient> for ChatClient {
    fn from(client: SlackChatClient) -> Self {
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// User state for the slack socket client.
struct SlackUserState {
    config: Config,
    db: DbClient,
    chat: ChatClient,
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    pub app_token: SlackApiToken,
    pub bot_token: SlackApiToken,
    pub bot_user_id: String,
    pub client: Arc<FullClient>,
    pub config: Config,
    pub db: DbClient,
}

impl Deref for SlackChatClient {
    type Target = FullClient;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config, db: DbClient) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID.

        let session = client.open_session(&bot_token);
        let bot_user = session.auth_test().await?;
        let bot_user_id = bot_user.user_id.0;

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            app_token,
            bot_token,
            bot_user_id,
            client,
            config: config.clone(),
            db,
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new()
            .with_command_events(handle_command_event)
            .with_interaction_events(handle_interaction_event)
            .with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState {
            config: self.config.clone(),
            db: self.db.clone(),
            chat: ChatClient::from(self.clone()),
        }));

        let socket_mode_listener = Arc::new(SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment.clone(),
            socket_mode_callbacks,
        ));

        // Register an app token to listen for events,
        socket_mode_listener.listen_for(&self.app_token).await?;

        // Start WS connections calling Slack API to get WS url for the token,
        // and wait for Ctrl-C to shutdown.
        socket_mode_listener.serve().await;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn post_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Res<MessageRef> {
        let message = SlackMessageContent::new().with_text(text.to_string());

        let mut request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message).with_link_names(true);

        // An empty thread timestamp means a top-level post.
        if !thread_ts.is_empty() {
            request = request.with_thread_ts(SlackTs(thread_ts.to_string()));
        }

        let session = self.client.open_session(&self.bot_token);

        let response = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(MessageRef {
            channel_id: response.channel.0,
            ts: response.ts.0,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_message_at(&self, channel_id: &str, ts: &str, inclusive: bool) -> Res<Option<ChatMessage>> {
        let request = SlackApiConversationsHistoryRequest::new()
            .with_channel(SlackChannelId(channel_id.to_string()))
            .with_latest(SlackTs(ts.to_string()))
            .with_inclusive(inclusive)
            .with_limit(1);

        let session = self.client.open_session(&self.bot_token);

        let response = session.conversations_history(&request).await.map_err(|e| anyhow::anyhow!("Failed to fetch history: {}", e))?;

        let message = response.messages.into_iter().next().map(|message| ChatMessage {
            ts: message.origin.ts.0,
            text: message.content.text.unwrap_or_default(),
            user_id: message.sender.user.map(|user| user.0),
        });

        Ok(message)
    }

    #[instrument(skip(self))]
    async fn resolve_user(&self, user_id: &str) -> Res<UserInfo> {
        let request = SlackApiUsersInfoRequest::new(SlackUserId(user_id.to_string()));

        let session = self.client.open_session(&self.bot_token);

        let response = session.users_info(&request).await.map_err(|e| anyhow::anyhow!("Failed to resolve user: {}", e))?;

        Ok(UserInfo {
            is_bot: response.user.flags.is_bot.unwrap_or(false) || response.user.id.0 == SLACKBOT_USER_ID,
            name: response.user.name.unwrap_or_default(),
        })
    }

    #[instrument(skip(self))]
    async fn list_non_bot_users(&self) -> Res<HashSet<String>> {
        let session = self.client.open_session(&self.bot_token);

        let mut users = HashSet::new();
        let mut cursor: Option<SlackCursorId> = None;

        loop {
            let mut request = SlackApiUsersListRequest::new().with_limit(USERS_LIST_PAGE_SIZE);

            if let Some(cursor) = cursor.take() {
                request = request.with_cursor(cursor);
            }

            let response = session.users_list(&request).await.map_err(|e| anyhow::anyhow!("Failed to list users: {}", e))?;

            for member in response.members {
                let is_bot = member.flags.is_bot.unwrap_or(false) || member.id.0 == SLACKBOT_USER_ID;
                let is_deleted = member.deleted.unwrap_or(false);

                if !is_bot && !is_deleted {
                    users.insert(member.id.0);
                }
            }

            cursor = response.response_metadata.and_then(|metadata| metadata.next_cursor).filter(|next| !next.0.is_empty());

            if cursor.is_none() {
                break;
            }
        }

        debug!("Roster has {} non-bot users.", users.len());

        Ok(users)
    }

    #[instrument(skip(self))]
    async fn get_permalink(&self, channel_id: &str, ts: &str) -> Res<String> {
        let request = SlackApiChatGetPermalinkRequest::new(SlackChannelId(channel_id.to_string()), SlackTs(ts.to_string()));

        let session = self.client.open_session(&self.bot_token);

        let response = session.chat_get_permalink(&request).await.map_err(|e| anyhow::anyhow!("Failed to get permalink: {}", e))?;

        Ok(response.permalink.to_string())
    }
}

// Event conversions.

/// Converts a Slack message event; `None` when it has no channel.
fn message_event_from_slack(event: &SlackMessageEvent) -> Option<MessageEvent> {
    let channel_id = event.origin.channel.as_ref()?.0.clone();

    Some(MessageEvent {
        channel_id,
        ts: event.origin.ts.0.clone(),
        text: event.content.as_ref().and_then(|content| content.text.clone()).unwrap_or_default(),
        user_id: event.sender.user.as_ref().map(|user| user.0.clone()),
        bot_id: event.sender.bot_id.as_ref().map(|bot| bot.0.clone()),
        subtype: event.subtype.as_ref().map(subtype_name),
    })
}

/// The wire name of a message subtype (e.g. `message_changed`).
fn subtype_name(subtype: &SlackMessageEventType) -> String {
    serde_json::to_value(subtype)
        .ok()
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_else(|| format!("{subtype:?}"))
}

/// Converts a Slack reaction event; `None` when the reacted-to item is not a message.
fn reaction_added_event_from_slack(event: &SlackReactionAddedEvent) -> Option<ReactionAddedEvent> {
    match &event.item {
        SlackReactionsItem::Message(message) => Some(ReactionAddedEvent {
            channel_id: message.origin.channel.as_ref()?.0.clone(),
            message_ts: message.origin.ts.0.clone(),
            reactor_id: event.user.0.clone(),
            reaction: event.reaction.0.clone(),
        }),
        _ => None,
    }
}

// Socket mode listener callbacks for Slack.

/// Handles command events from Slack.
async fn handle_command_event(
    event: SlackCommandEvent,
    _client: Arc<SlackHyperClient>,
    _states: SlackClientEventsUserState,
) -> Result<SlackCommandEventResponse, Box<dyn std::error::Error + Send + Sync>> {
    debug!("[COMMAND] {:#?}", event);
    Ok(SlackCommandEventResponse::new(SlackMessageContent::new().with_text("No app commands are currently supported.".into())))
}

/// Handles interaction events from Slack.
async fn handle_interaction_event(event: SlackInteractionEvent, _client: Arc<SlackHyperClient>, _states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    debug!("[INTERACTION] {:#?}", event);
    Ok(())
}

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let event = event_callback.event;
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    match event {
        SlackEventCallbackBody::Message(slack_message_event) => {
            let Some(event) = message_event_from_slack(&slack_message_event) else {
                warn!("Skipping message event without a channel.");
                return Ok(());
            };

            interaction::router::route_message_event(event, user_state.config.clone(), user_state.db.clone(), user_state.chat.clone());
        }
        SlackEventCallbackBody::ReactionAdded(slack_reaction_added_event) => {
            let Some(event) = reaction_added_event_from_slack(&slack_reaction_added_event) else {
                debug!("Skipping reaction on a non-message item.");
                return Ok(());
            };

            interaction::router::route_reaction_added_event(event, user_state.config.clone(), user_state.db.clone(), user_state.chat.clone());
        }
        _ => {
            debug!("Received unhandled push event; acknowledging as a no-op.")
        }
    }

    Ok(())
}

// Tests.
