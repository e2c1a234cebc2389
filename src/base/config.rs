//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};

use super::types::{Res, Void};

/// Default database endpoint; the in-memory engine.
fn default_db_endpoint() -> String {
    "mem://".to_string()
}

/// Default database namespace.
fn default_db_namespace() -> String {
    "nag".to_string()
}

/// Default database name.
fn default_db_database() -> String {
    "bot".to_string()
}

fn default_true() -> bool {
    true
}

/// Default time a mentioned user has to react (two days).
fn default_mention_response_window() -> Duration {
    Duration::from_secs(2 * 24 * 3600)
}

/// Default time the workspace has to react to an announcement (one day).
fn default_announcement_response_window() -> Duration {
    Duration::from_secs(24 * 3600)
}

/// Default time between two sweep passes.
fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

/// Default pause between two outbound notifications.
///
/// Slack allows roughly one `chat.postMessage` per second per channel.
fn default_notification_pause() -> Duration {
    Duration::from_millis(1100)
}

/// Default literal that marks an "attention-all" broadcast.
fn default_broadcast_marker() -> String {
    "<!channel>".to_string()
}

/// Configuration for the nag-bot application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Slack app token (`SLACK_APP_TOKEN`).
    pub slack_app_token: String,
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    pub slack_bot_token: String,
    /// Database endpoint URL (`DB_ENDPOINT`), e.g. `ws://localhost:8000` or `mem://`.
    #[serde(default = "default_db_endpoint")]
    pub db_endpoint: String,
    /// Database username (`DB_USERNAME`).
    #[serde(default)]
    pub db_username: String,
    /// Database password (`DB_PASSWORD`).
    #[serde(default)]
    pub db_password: String,
    /// Database namespace (`DB_NAMESPACE`).
    #[serde(default = "default_db_namespace")]
    pub db_namespace: String,
    /// Database name (`DB_DATABASE`).
    #[serde(default = "default_db_database")]
    pub db_database: String,
    /// Whether user mentions are tracked (`MENTION_TRACKING_ENABLED`).
    #[serde(default = "default_true")]
    pub mention_tracking_enabled: bool,
    /// Whether announcements are tracked (`ANNOUNCEMENT_TRACKING_ENABLED`).
    #[serde(default = "default_true")]
    pub announcement_tracking_enabled: bool,
    /// Seconds a mentioned user has to react before the reminder (`MENTION_RESPONSE_WINDOW`).
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_mention_response_window")]
    pub mention_response_window: Duration,
    /// Seconds the workspace has to react to an announcement (`ANNOUNCEMENT_RESPONSE_WINDOW`).
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_announcement_response_window")]
    pub announcement_response_window: Duration,
    /// Seconds between mention sweeps (`MENTION_SWEEP_INTERVAL`).
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_sweep_interval")]
    pub mention_sweep_interval: Duration,
    /// Seconds between announcement sweeps (`ANNOUNCEMENT_SWEEP_INTERVAL`).
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_sweep_interval")]
    pub announcement_sweep_interval: Duration,
    /// Milliseconds to wait between consecutive reminder sends (`NOTIFICATION_PAUSE`).
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_notification_pause")]
    pub notification_pause: Duration,
    /// User whose broadcasts are tracked as announcements (`ANNOUNCEMENT_SENDER_ID`).
    #[serde(default)]
    pub announcement_sender_id: String,
    /// Channel in which broadcasts are tracked as announcements (`ANNOUNCEMENT_CHANNEL_ID`).
    #[serde(default)]
    pub announcement_channel_id: String,
    /// Literal that marks a broadcast (`BROADCAST_MARKER`).
    #[serde(default = "default_broadcast_marker")]
    pub broadcast_marker: String,
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder();

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        // Environment variables take precedence over the file.
        cfg = cfg.add_source(config::Environment::default().prefix("NAG_BOT").prefix_separator("_").try_parsing(true));

        let result = Config::from(cfg.build()?.try_deserialize::<ConfigInner>()?);

        result.validate()?;

        Ok(result)
    }

    /// Checks the loaded values for internal consistency.
    pub fn validate(&self) -> Void {
        if self.mention_response_window.is_zero() || self.announcement_response_window.is_zero() {
            return Err(anyhow::anyhow!("Response windows must be greater than zero."));
        }

        if self.mention_sweep_interval.is_zero() || self.announcement_sweep_interval.is_zero() {
            return Err(anyhow::anyhow!("Sweep intervals must be greater than zero."));
        }

        if self.announcement_tracking_enabled && (self.announcement_sender_id.is_empty() || self.announcement_channel_id.is_empty()) {
            return Err(anyhow::anyhow!("Announcement tracking requires both an announcement sender ID and an announcement channel ID."));
        }

        if self.broadcast_marker.is_empty() {
            return Err(anyhow::anyhow!("The broadcast marker must not be empty."));
        }

        Ok(())
    }
}

// Tests.
