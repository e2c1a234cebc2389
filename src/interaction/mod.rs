//! Event handling and obligation tracking for nag-bot.
//!
//! This module provides the tracking engine:
//! - Qualifying and routing incoming messages and reactions
//! - Creating obligations for mentions and announcements
//! - Resolving obligations as users react
//! - Sweeping expired obligations and sending reminders

pub mod acknowledgment;
pub mod announcement;
pub mod mention;
pub mod qualifier;
pub mod router;
pub mod sweep;
