//! Static routing of inbound chat events to their handlers.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::{
    base::{
        config::Config,
        types::{MessageEvent, ReactionAddedEvent},
    },
    service::{chat::ChatClient, db::DbClient},
};

use super::{acknowledgment, announcement, mention};

/// Pattern for a user mention, e.g. `<@U123>` or `<@W123|alice>`.
pub fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();

    PATTERN.get_or_init(|| Regex::new(r"<@([UW][A-Za-z0-9]+)(?:\|[^>]*)?>").expect("mention pattern is valid"))
}

/// Whether `text` mentions at least one user.
pub fn has_mention(text: &str) -> bool {
    mention_pattern().is_match(text)
}

/// Whether `text` carries the configured broadcast marker.
pub fn has_broadcast_marker(text: &str, config: &Config) -> bool {
    text.contains(&config.broadcast_marker)
}

/// A message route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Mention,
    Announcement,
}

/// Every message route, in dispatch order.
pub const ROUTES: &[Route] = &[Route::Mention, Route::Announcement];

impl Route {
    /// Whether the route is switched on.
    pub fn enabled(&self, config: &Config) -> bool {
        match self {
            Route::Mention => config.mention_tracking_enabled,
            Route::Announcement => config.announcement_tracking_enabled,
        }
    }

    /// Whether the route's pattern matches the message text.
    pub fn matches(&self, text: &str, config: &Config) -> bool {
        match self {
            Route::Mention => has_mention(text),
            Route::Announcement => has_broadcast_marker(text, config),
        }
    }
}

/// The enabled routes whose pattern matches `text`.
pub fn matching_routes(text: &str, config: &Config) -> Vec<Route> {
    ROUTES.iter().copied().filter(|route| route.enabled(config) && route.matches(text, config)).collect()
}

/// Dispatches a message to every matching route.
#[instrument(skip_all)]
pub fn route_message_event(event: MessageEvent, config: Config, db: DbClient, chat: ChatClient) {
    let routes = matching_routes(&event.text, &config);

    if routes.is_empty() {
        debug!("Message `{}` in `{}` matches no route.", event.ts, event.channel_id);
        return;
    }

    for route in routes {
        match route {
            Route::Mention => mention::handle_mention_message(event.clone(), config.clone(), db.clone(), chat.clone()),
            Route::Announcement => announcement::handle_announcement_message(event.clone(), config.clone(), db.clone(), chat.clone()),
        }
    }
}

/// Dispatches a reaction to the acknowledgment handler.
#[instrument(skip_all)]
pub fn route_reaction_added_event(event: ReactionAddedEvent, config: Config, db: DbClient, chat: ChatClient) {
    if !config.mention_tracking_enabled && !config.announcement_tracking_enabled {
        debug!("All tracking is disabled; ignoring reaction.");
        return;
    }

    acknowledgment::handle_reaction_added(event, config, db, chat);
}

// Tests.
