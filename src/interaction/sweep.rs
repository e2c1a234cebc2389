//! Periodic reconciliation of expired and settled obligations.
//!
//! Expired rows are deleted in the same statement that reads them, so a reminder
//! that fails to send (or a crash mid-pass) is not retried.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::{
    base::types::Res,
    service::{db::DbClient, notifier::Notifier},
};

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Rows removed because every mentioned user had reacted.
    pub resolved: usize,
    /// Rows removed because their deadline passed.
    pub expired: usize,
    /// Reminders delivered.
    pub sent: usize,
    /// Reminders that failed to send.
    pub failed: usize,
}

/// Runs one mention sweep.
///
/// Settled rows are dropped first, so a message whose mentioned users all reacted
/// never produces a reminder.  Each expired row with users left produces one
/// reminder in the original thread.
#[instrument(skip_all)]
pub async fn run_mention_sweep(db: &DbClient, notifier: &Notifier, now: DateTime<Utc>) -> Res<SweepReport> {
    let mut report = SweepReport {
        resolved: db.delete_resolved_mention_obligations().await?,
        ..Default::default()
    };

    let expired = db.take_expired_mention_obligations(now).await?;
    report.expired = expired.len();

    for obligation in expired.iter().filter(|obligation| !obligation.nonresponder_ids.is_empty()) {
        if report.sent + report.failed > 0 {
            notifier.pause().await;
        }

        if notifier.remind_mentioned_users(&obligation.channel_id, &obligation.message_ts, &obligation.nonresponder_ids).await {
            report.sent += 1;
        } else {
            report.failed += 1;
        }
    }

    if report != SweepReport::default() {
        info!("Mention sweep: {:?}", report);
    }

    Ok(report)
}

/// Runs one announcement sweep.
///
/// Each expired row is diffed against a freshly fetched roster, and every user
/// missing from its responders gets a direct reminder.
#[instrument(skip_all)]
pub async fn run_announcement_sweep(db: &DbClient, notifier: &Notifier, now: DateTime<Utc>) -> Res<SweepReport> {
    let expired = db.take_expired_announcement_obligations(now).await?;

    let mut report = SweepReport {
        expired: expired.len(),
        ..Default::default()
    };

    for obligation in &expired {
        let Some(roster) = notifier.roster().await else {
            warn!("Skipping reminders for announcement `{}` in `{}`.", obligation.message_ts, obligation.channel_id);
            continue;
        };

        let nonresponders = nonresponders(&roster, &obligation.responder_ids);

        if nonresponders.is_empty() {
            continue;
        }

        let permalink = notifier.permalink(&obligation.channel_id, &obligation.message_ts).await;

        for user_id in nonresponders {
            notifier.pause().await;

            if notifier.remind_announcement_recipient(user_id, &obligation.channel_id, permalink.as_deref()).await {
                report.sent += 1;
            } else {
                report.failed += 1;
            }
        }
    }

    if report != SweepReport::default() {
        info!("Announcement sweep: {:?}", report);
    }

    Ok(report)
}

/// Roster members who are not among the responders, sorted.
pub fn nonresponders<'a>(roster: &'a HashSet<String>, responder_ids: &[String]) -> Vec<&'a str> {
    let responders = responder_ids.iter().map(String::as_str).collect::<HashSet<_>>();

    let mut missing = roster.iter().map(String::as_str).filter(|user_id| !responders.contains(user_id)).collect::<Vec<_>>();
    missing.sort_unstable();

    missing
}

// Tests.
