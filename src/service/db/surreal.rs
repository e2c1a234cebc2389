//! SurrealDB implementation of the obligation store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::{
    Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
    sql::Datetime,
};
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    types::{Res, Void},
};

use super::{AnnouncementObligation, DbClient, GenericDbClient, MentionObligation};

/// Table and index definitions.
///
/// Each obligation's record ID is `[channel_id, message_ts]`, which makes the natural key unique.
const SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS mention_obligation SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS channel_id ON mention_obligation TYPE string;
DEFINE FIELD IF NOT EXISTS message_ts ON mention_obligation TYPE string;
DEFINE FIELD IF NOT EXISTS remind_time ON mention_obligation TYPE datetime;
DEFINE FIELD IF NOT EXISTS nonresponder_ids ON mention_obligation TYPE array<string>;
DEFINE INDEX IF NOT EXISTS mention_obligation_remind_time ON mention_obligation FIELDS remind_time;

DEFINE TABLE IF NOT EXISTS announcement_obligation SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS channel_id ON announcement_obligation TYPE string;
DEFINE FIELD IF NOT EXISTS message_ts ON announcement_obligation TYPE string;
DEFINE FIELD IF NOT EXISTS remind_time ON announcement_obligation TYPE datetime;
DEFINE FIELD IF NOT EXISTS responder_ids ON announcement_obligation TYPE array<string>;
DEFINE INDEX IF NOT EXISTS announcement_obligation_remind_time ON announcement_obligation FIELDS remind_time;
"#;

// Extra methods on `DbClient` applied by the surreal implementation.

impl DbClient {
    /// Connects to the SurrealDB instance named by the configuration.
    pub async fn surreal(config: &Config) -> Res<Self> {
        let client = SurrealDbClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }

    /// Creates a fresh in-memory store; used for tests and local runs.
    pub async fn surreal_memory() -> Res<Self> {
        let client = SurrealDbClient::memory().await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Row types.

/// A mention obligation as stored in SurrealDB.
#[derive(Debug, Serialize, Deserialize)]
struct SurrealMentionObligation {
    channel_id: String,
    message_ts: String,
    remind_time: Datetime,
    nonresponder_ids: Vec<String>,
}

impl From<SurrealMentionObligation> for MentionObligation {
    fn from(row: SurrealMentionObligation) -> Self {
        Self {
            channel_id: row.channel_id,
            message_ts: row.message_ts,
            remind_time: row.remind_time.0,
            nonresponder_ids: row.nonresponder_ids,
        }
    }
}

/// An announcement obligation as stored in SurrealDB.
#[derive(Debug, Serialize, Deserialize)]
struct SurrealAnnouncementObligation {
    channel_id: String,
    message_ts: String,
    remind_time: Datetime,
    responder_ids: Vec<String>,
}

impl From<SurrealAnnouncementObligation> for AnnouncementObligation {
    fn from(row: SurrealAnnouncementObligation) -> Self {
        Self {
            channel_id: row.channel_id,
            message_ts: row.message_ts,
            remind_time: row.remind_time.0,
            responder_ids: row.responder_ids,
        }
    }
}

// Client.

/// SurrealDB obligation store.
#[derive(Clone)]
pub struct SurrealDbClient {
    db: Surreal<Any>,
}

impl SurrealDbClient {
    /// Connect, authenticate, and define the schema.
    #[instrument(name = "SurrealDbClient::new", skip_all)]
    pub async fn new(config: &Config) -> Res<Self> {
        let db = any::connect(config.db_endpoint.as_str()).await?;

        // The embedded engines have no users to sign in as.
        if !config.db_endpoint.starts_with("mem://") {
            db.signin(Root {
                username: &config.db_username,
                password: &config.db_password,
            })
            .await?;
        }

        db.use_ns(config.db_namespace.as_str()).use_db(config.db_database.as_str()).await?;

        Self::initialize(db).await
    }

    /// Create an in-memory store.
    #[instrument(name = "SurrealDbClient::memory", skip_all)]
    pub async fn memory() -> Res<Self> {
        let db = any::connect("mem://").await?;

        db.use_ns("nag").use_db("bot").await?;

        Self::initialize(db).await
    }

    async fn initialize(db: Surreal<Any>) -> Res<Self> {
        db.query(SCHEMA).await?.check()?;

        info!("Database initialized successfully.");

        Ok(Self { db })
    }
}

/// Whether an error means the record already exists.
fn is_conflict(err: &surrealdb::Error) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("already exists") || message.contains("already contains")
}

#[async_trait]
impl GenericDbClient for SurrealDbClient {
    #[instrument(skip(self))]
    async fn create_mention_obligation(&self, obligation: &MentionObligation) -> Void {
        let result = self
            .db
            .query(
                "CREATE type::thing('mention_obligation', [$channel_id, $message_ts]) CONTENT { \
                    channel_id: $channel_id, \
                    message_ts: $message_ts, \
                    remind_time: $remind_time, \
                    nonresponder_ids: $nonresponder_ids \
                 } RETURN NONE;",
            )
            .bind(("channel_id", obligation.channel_id.clone()))
            .bind(("message_ts", obligation.message_ts.clone()))
            .bind(("remind_time", Datetime::from(obligation.remind_time)))
            .bind(("nonresponder_ids", obligation.nonresponder_ids.clone()))
            .await?
            .check();

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_conflict(&err) => {
                debug!("Mention obligation for `{}` / `{}` already exists.", obligation.channel_id, obligation.message_ts);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self))]
    async fn remove_mention_nonresponder(&self, channel_id: &str, message_ts: &str, user_id: &str) -> Void {
        self.db
            .query("UPDATE type::thing('mention_obligation', [$channel_id, $message_ts]) SET nonresponder_ids -= $user_id RETURN NONE;")
            .bind(("channel_id", channel_id.to_string()))
            .bind(("message_ts", message_ts.to_string()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_mention_obligation(&self, channel_id: &str, message_ts: &str) -> Res<Option<MentionObligation>> {
        let mut response = self
            .db
            .query("SELECT * FROM type::thing('mention_obligation', [$channel_id, $message_ts]);")
            .bind(("channel_id", channel_id.to_string()))
            .bind(("message_ts", message_ts.to_string()))
            .await?;

        let mut rows: Vec<SurrealMentionObligation> = response.take(0)?;

        Ok(rows.pop().map(Into::into))
    }

    #[instrument(skip(self))]
    async fn delete_resolved_mention_obligations(&self) -> Res<usize> {
        let mut response = self.db.query("DELETE mention_obligation WHERE array::len(nonresponder_ids) = 0 RETURN BEFORE;").await?;

        let rows: Vec<SurrealMentionObligation> = response.take(0)?;

        Ok(rows.len())
    }

    #[instrument(skip(self))]
    async fn take_expired_mention_obligations(&self, now: DateTime<Utc>) -> Res<Vec<MentionObligation>> {
        let mut response = self
            .db
            .query("DELETE mention_obligation WHERE remind_time <= $now RETURN BEFORE;")
            .bind(("now", Datetime::from(now)))
            .await?;

        let rows: Vec<SurrealMentionObligation> = response.take(0)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn create_announcement_obligation(&self, obligation: &AnnouncementObligation) -> Void {
        let result = self
            .db
            .query(
                "CREATE type::thing('announcement_obligation', [$channel_id, $message_ts]) CONTENT { \
                    channel_id: $channel_id, \
                    message_ts: $message_ts, \
                    remind_time: $remind_time, \
                    responder_ids: $responder_ids \
                 } RETURN NONE;",
            )
            .bind(("channel_id", obligation.channel_id.clone()))
            .bind(("message_ts", obligation.message_ts.clone()))
            .bind(("remind_time", Datetime::from(obligation.remind_time)))
            .bind(("responder_ids", obligation.responder_ids.clone()))
            .await?
            .check();

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_conflict(&err) => {
                debug!("Announcement obligation for `{}` / `{}` already exists.", obligation.channel_id, obligation.message_ts);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self))]
    async fn add_announcement_responder(&self, channel_id: &str, message_ts: &str, user_id: &str) -> Void {
        // `array::add` only appends values that are not already present; `UPDATE` on a missing record is a no-op.
        self.db
            .query("UPDATE type::thing('announcement_obligation', [$channel_id, $message_ts]) SET responder_ids = array::add(responder_ids, $user_id) RETURN NONE;")
            .bind(("channel_id", channel_id.to_string()))
            .bind(("message_ts", message_ts.to_string()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_announcement_obligation(&self, channel_id: &str, message_ts: &str) -> Res<Option<AnnouncementObligation>> {
        let mut response = self
            .db
            .query("SELECT * FROM type::thing('announcement_obligation', [$channel_id, $message_ts]);")
            .bind(("channel_id", channel_id.to_string()))
            .bind(("message_ts", message_ts.to_string()))
            .await?;

        let mut rows: Vec<SurrealAnnouncementObligation> = response.take(0)?;

        Ok(rows.pop().map(Into::into))
    }

    #[instrument(skip(self))]
    async fn take_expired_announcement_obligations(&self, now: DateTime<Utc>) -> Res<Vec<AnnouncementObligation>> {
        let mut response = self
            .db
            .query("DELETE announcement_obligation WHERE remind_time <= $now RETURN BEFORE;")
            .bind(("now", Datetime::from(now)))
            .await?;

        let rows: Vec<SurrealAnnouncementObligation> = response.take(0)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// Tests.
