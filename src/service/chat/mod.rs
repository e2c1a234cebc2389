pub mod slack;

use std::{collections::HashSet, ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{ChatMessage, MessageRef, Res, UserInfo, Void};

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines the outbound calls the bot makes against a chat platform
/// like Slack, plus the listener that feeds inbound events to the interaction
/// layer.  Implementing this trait allows different chat services to be used
/// with the nag-bot.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Get the bot user ID.
    ///
    /// Used to make sure the bot never tracks its own reminder posts.
    fn bot_user_id(&self) -> &str;

    /// Start the chat client listener.
    ///
    /// This sets up event listeners for the chat platform and begins processing
    /// incoming messages and reactions.
    async fn start(&self) -> Void;

    /// Post a message to a channel (or, given a user ID, as a direct message).
    ///
    /// When `thread_ts` is non-empty, the message is posted as a reply in that thread.
    async fn post_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Res<MessageRef>;

    /// Fetch the newest message at (or, if `inclusive` is false, strictly before) `ts`.
    ///
    /// Returns `None` when the channel history has no such message.
    async fn fetch_message_at(&self, channel_id: &str, ts: &str, inclusive: bool) -> Res<Option<ChatMessage>>;

    /// Resolve a user ID to the bits of profile the bot needs.
    async fn resolve_user(&self, user_id: &str) -> Res<UserInfo>;

    /// List every active, non-bot user in the workspace.
    async fn list_non_bot_users(&self) -> Res<HashSet<String>>;

    /// Get a permanent link to a message.
    async fn get_permalink(&self, channel_id: &str, ts: &str) -> Res<String>;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
