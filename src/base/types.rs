//! Common result aliases and transport-neutral chat types.

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// A new message posted in a channel.
///
/// This is the transport-neutral shape of a Slack `message` event; the chat
/// service converts platform events into this before handing them to the
/// interaction layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub ts: String,
    pub text: String,
    pub user_id: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
}

/// A reaction added to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionAddedEvent {
    /// Channel of the reacted-to message.
    pub channel_id: String,
    /// Timestamp of the reacted-to message.
    pub message_ts: String,
    pub reactor_id: String,
    pub reaction: String,
}

/// A message fetched back from channel history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessage {
    pub ts: String,
    pub text: String,
    pub user_id: Option<String>,
}

/// The location of a message the bot posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: String,
    pub ts: String,
}

/// Resolved user profile bits the bot cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub is_bot: bool,
    pub name: String,
}

/// Parses a Slack message timestamp (`"1712345678.123456"`) into a UTC instant.
///
/// The fractional part is read as microseconds directly, so no precision is lost
/// through a float conversion.
pub fn parse_slack_ts(ts: &str) -> Res<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, ""));

    let secs: i64 = secs.parse().with_context(|| format!("Invalid Slack timestamp `{ts}`."))?;

    if frac.len() > 9 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(anyhow!("Invalid Slack timestamp fraction `{ts}`."));
    }

    let nanos: u32 = if frac.is_empty() { 0 } else { format!("{frac:0<9}").parse()? };

    DateTime::from_timestamp(secs, nanos).ok_or_else(|| anyhow!("Slack timestamp `{ts}` is out of range."))
}

/// Computes the deadline of an obligation created by the message at `ts`.
pub fn deadline_after(ts: &str, window: std::time::Duration) -> Res<DateTime<Utc>> {
    let posted_at = parse_slack_ts(ts)?;
    let window = chrono::Duration::from_std(window)?;

    posted_at.checked_add_signed(window).ok_or_else(|| anyhow!("Deadline for `{ts}` is out of range."))
}

// Tests.
