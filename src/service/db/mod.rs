use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::base::types::{Res, Void};

pub mod surreal;

// Types.

/// An outstanding obligation for mentioned users to react to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionObligation {
    pub channel_id: String,
    pub message_ts: String,
    /// Deadline for the final reminder.
    pub remind_time: DateTime<Utc>,
    /// Mentioned users who have not reacted yet; sorted, without duplicates.
    pub nonresponder_ids: Vec<String>,
}

/// An outstanding obligation for the workspace to react to an announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementObligation {
    pub channel_id: String,
    pub message_ts: String,
    /// Deadline for the reminder sweep.
    pub remind_time: DateTime<Utc>,
    /// Users who have reacted so far; starts with the sender.
    pub responder_ids: Vec<String>,
}

// Traits.

/// Generic obligation store trait that clients must implement.
///
/// Every method is a single, independently committed statement scoped to one
/// row or one bounded set of rows, so handlers and sweeps may run against it
/// concurrently.  Mutations are idempotent: removing an absent user, adding a
/// present user, or touching a row that no longer exists are all no-ops.
#[async_trait]
pub trait GenericDbClient: Send + Sync + 'static {
    /// Records a new mention obligation.
    ///
    /// A second insert for the same `(channel_id, message_ts)` is ignored.
    async fn create_mention_obligation(&self, obligation: &MentionObligation) -> Void;

    /// Removes one user from a mention obligation's nonresponders.
    async fn remove_mention_nonresponder(&self, channel_id: &str, message_ts: &str, user_id: &str) -> Void;

    /// Gets a mention obligation by its key.
    async fn get_mention_obligation(&self, channel_id: &str, message_ts: &str) -> Res<Option<MentionObligation>>;

    /// Deletes every mention obligation whose nonresponders are all gone, returning how many were deleted.
    async fn delete_resolved_mention_obligations(&self) -> Res<usize>;

    /// Deletes and returns every mention obligation whose deadline is at or before `now`.
    async fn take_expired_mention_obligations(&self, now: DateTime<Utc>) -> Res<Vec<MentionObligation>>;

    /// Records a new announcement obligation.
    ///
    /// A second insert for the same `(channel_id, message_ts)` is ignored.
    async fn create_announcement_obligation(&self, obligation: &AnnouncementObligation) -> Void;

    /// Adds one user to an announcement obligation's responders, unless already present.
    async fn add_announcement_responder(&self, channel_id: &str, message_ts: &str, user_id: &str) -> Void;

    /// Gets an announcement obligation by its key.
    async fn get_announcement_obligation(&self, channel_id: &str, message_ts: &str) -> Res<Option<AnnouncementObligation>>;

    /// Deletes and returns every announcement obligation whose deadline is at or before `now`.
    async fn take_expired_announcement_obligations(&self, now: DateTime<Utc>) -> Res<Vec<AnnouncementObligation>>;
}

/// Database client for nag-bot.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    /// The database client instance.
    pub inner: Arc<dyn GenericDbClient>,
}

impl Deref for DbClient {
    type Target = dyn GenericDbClient;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}
