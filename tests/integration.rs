#![cfg(test)]

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mockall::mock;
use nag_bot::{
    base::{
        config::{Config, ConfigInner},
        types::{ChatMessage, MessageEvent, MessageRef, ReactionAddedEvent, Res, UserInfo, Void},
    },
    interaction::{
        acknowledgment::process_reaction_added,
        announcement::process_announcement_message,
        mention::process_mention_message,
        router::route_message_event,
        sweep::{run_announcement_sweep, run_mention_sweep},
    },
    service::{
        chat::{ChatClient, GenericChatClient},
        db::{AnnouncementObligation, DbClient, GenericDbClient, MentionObligation},
        notifier::Notifier,
    },
};

// Mocks.

// Mock chat client for testing.

mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        fn bot_user_id(&self) -> &str;
        async fn start(&self) -> Void;
        async fn post_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Res<MessageRef>;
        async fn fetch_message_at(&self, channel_id: &str, ts: &str, inclusive: bool) -> Res<Option<ChatMessage>>;
        async fn resolve_user(&self, user_id: &str) -> Res<UserInfo>;
        async fn list_non_bot_users(&self) -> Res<HashSet<String>>;
        async fn get_permalink(&self, channel_id: &str, ts: &str) -> Res<String>;
    }
}

// Mock store for sweeps that must not depend on storage timing.

mock! {
    pub Db {}

    #[async_trait]
    impl GenericDbClient for Db {
        async fn create_mention_obligation(&self, obligation: &MentionObligation) -> Void;
        async fn remove_mention_nonresponder(&self, channel_id: &str, message_ts: &str, user_id: &str) -> Void;
        async fn get_mention_obligation(&self, channel_id: &str, message_ts: &str) -> Res<Option<MentionObligation>>;
        async fn delete_resolved_mention_obligations(&self) -> Res<usize>;
        async fn take_expired_mention_obligations(&self, now: DateTime<Utc>) -> Res<Vec<MentionObligation>>;
        async fn create_announcement_obligation(&self, obligation: &AnnouncementObligation) -> Void;
        async fn add_announcement_responder(&self, channel_id: &str, message_ts: &str, user_id: &str) -> Void;
        async fn get_announcement_obligation(&self, channel_id: &str, message_ts: &str) -> Res<Option<AnnouncementObligation>>;
        async fn take_expired_announcement_obligations(&self, now: DateTime<Utc>) -> Res<Vec<AnnouncementObligation>>;
    }
}

/// Sent messages, as `(channel_id, thread_ts, text)`.
type Outbox = Arc<Mutex<Vec<(String, String, String)>>>;

fn get_mock_chat() -> MockChat {
    let mut mock = MockChat::new();

    mock.expect_bot_user_id().return_const("UBOT".to_string());

    mock
}

/// Makes `post_message` succeed and record every message it is given.
fn record_posts(mock: &mut MockChat) -> Outbox {
    let outbox: Outbox = Arc::default();
    let sink = outbox.clone();

    mock.expect_post_message().returning(move |channel_id, thread_ts, text| {
        sink.lock().unwrap().push((channel_id.to_string(), thread_ts.to_string(), text.to_string()));

        Ok(MessageRef {
            channel_id: channel_id.to_string(),
            ts: "9999.000001".to_string(),
        })
    });

    outbox
}

/// Makes `resolve_user` treat `bots` as bots, `unknown` as unresolvable, and everyone else as human.
fn resolve_users(mock: &mut MockChat, bots: &'static [&'static str], unknown: &'static [&'static str]) {
    mock.expect_resolve_user().returning(move |user_id| {
        if unknown.contains(&user_id) {
            return Err(anyhow::anyhow!("user_not_found"));
        }

        Ok(UserInfo {
            is_bot: bots.contains(&user_id),
            name: user_id.to_lowercase(),
        })
    });
}

/// Makes `fetch_message_at` return a message with the given text and author.
fn history_returns(mock: &mut MockChat, text: &'static str, user_id: &'static str) {
    mock.expect_fetch_message_at().returning(move |_, ts, _| {
        Ok(Some(ChatMessage {
            ts: ts.to_string(),
            text: text.to_string(),
            user_id: Some(user_id.to_string()),
        }))
    });
}

fn test_config() -> Config {
    Config {
        inner: Arc::new(ConfigInner {
            slack_app_token: "xapp-test".to_string(),
            slack_bot_token: "xoxb-test".to_string(),
            db_endpoint: "mem://".to_string(),
            mention_tracking_enabled: true,
            announcement_tracking_enabled: true,
            mention_response_window: Duration::from_secs(172_800),
            announcement_response_window: Duration::from_secs(60),
            mention_sweep_interval: Duration::from_secs(60),
            announcement_sweep_interval: Duration::from_secs(60),
            notification_pause: Duration::ZERO,
            announcement_sender_id: "UBOSS".to_string(),
            announcement_channel_id: "CGENERAL".to_string(),
            broadcast_marker: "<!channel>".to_string(),
            ..Default::default()
        }),
    }
}

/// Helper function to setup the test environment.
async fn setup_test_environment(mock: MockChat) -> (Config, DbClient, ChatClient) {
    let config = test_config();

    // Initialize the database (using in-memory for tests).
    let db = DbClient::surreal_memory().await.expect("Failed to create DB client");

    let chat = ChatClient::new(Arc::new(mock));

    (config, db, chat)
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn message(channel_id: &str, ts: &str, user_id: &str, text: &str) -> MessageEvent {
    MessageEvent {
        channel_id: channel_id.to_string(),
        ts: ts.to_string(),
        text: text.to_string(),
        user_id: Some(user_id.to_string()),
        ..Default::default()
    }
}

fn reaction(channel_id: &str, message_ts: &str, reactor_id: &str, emoji: &str) -> ReactionAddedEvent {
    ReactionAddedEvent {
        channel_id: channel_id.to_string(),
        message_ts: message_ts.to_string(),
        reactor_id: reactor_id.to_string(),
        reaction: emoji.to_string(),
    }
}

// Mention tracking.

#[tokio::test]
async fn test_mention_excludes_bots_and_settles_on_reaction() {
    let mut mock = get_mock_chat();
    resolve_users(&mut mock, &["U2"], &[]);
    history_returns(&mut mock, "hello <@U1> <@U2>", "UAUTHOR");
    mock.expect_post_message().never();

    let (config, db, chat) = setup_test_environment(mock).await;

    process_mention_message(&message("C1", "1000", "UAUTHOR", "hello <@U1> <@U2>"), &config, &db, &chat).await.unwrap();

    let obligation = db.get_mention_obligation("C1", "1000").await.unwrap().expect("obligation should exist");
    assert_eq!(
        obligation,
        MentionObligation {
            channel_id: "C1".to_string(),
            message_ts: "1000".to_string(),
            remind_time: at(173_800),
            nonresponder_ids: vec!["U1".to_string()],
        }
    );

    process_reaction_added(&reaction("C1", "1000", "U1", "eyes"), &config, &db, &chat).await.unwrap();

    let obligation = db.get_mention_obligation("C1", "1000").await.unwrap().expect("obligation should still exist");
    assert!(obligation.nonresponder_ids.is_empty());

    // Settled rows are dropped before the expiry pass, so no reminder goes out.
    let notifier = Notifier::new(chat.clone(), config.notification_pause);
    let report = run_mention_sweep(&db, &notifier, at(200_000)).await.unwrap();

    assert_eq!(report.resolved, 1);
    assert_eq!(report.sent, 0);
    assert!(db.get_mention_obligation("C1", "1000").await.unwrap().is_none());
}

#[tokio::test]
async fn test_mention_repeated_reactions_are_idempotent() {
    let mut mock = get_mock_chat();
    resolve_users(&mut mock, &[], &[]);
    history_returns(&mut mock, "<@U1> <@U3> please review", "UAUTHOR");

    let (config, db, chat) = setup_test_environment(mock).await;

    process_mention_message(&message("C1", "1000", "UAUTHOR", "<@U1> <@U3> please review"), &config, &db, &chat).await.unwrap();

    process_reaction_added(&reaction("C1", "1000", "U1", "eyes"), &config, &db, &chat).await.unwrap();
    process_reaction_added(&reaction("C1", "1000", "U1", "thumbsup"), &config, &db, &chat).await.unwrap();

    let obligation = db.get_mention_obligation("C1", "1000").await.unwrap().unwrap();
    assert_eq!(obligation.nonresponder_ids, vec!["U3".to_string()]);
}

#[tokio::test]
async fn test_mention_skips_unresolvable_users() {
    let mut mock = get_mock_chat();
    resolve_users(&mut mock, &[], &["U9"]);

    let (config, db, chat) = setup_test_environment(mock).await;

    process_mention_message(&message("C1", "1000", "UAUTHOR", "<@U1> <@U9|ghost>"), &config, &db, &chat).await.unwrap();

    let obligation = db.get_mention_obligation("C1", "1000").await.unwrap().unwrap();
    assert_eq!(obligation.nonresponder_ids, vec!["U1".to_string()]);

    // Nothing resolvable means nothing tracked.
    process_mention_message(&message("C1", "2000", "UAUTHOR", "<@U9> are you there?"), &config, &db, &chat).await.unwrap();
    assert!(db.get_mention_obligation("C1", "2000").await.unwrap().is_none());
}

#[tokio::test]
async fn test_mention_ignores_non_qualifying_messages() {
    let mut mock = get_mock_chat();
    mock.expect_resolve_user().never();

    let (config, db, chat) = setup_test_environment(mock).await;

    let edited = MessageEvent {
        subtype: Some("message_changed".to_string()),
        ..message("C1", "1000", "UAUTHOR", "<@U1>")
    };
    process_mention_message(&edited, &config, &db, &chat).await.unwrap();

    let from_bot = MessageEvent {
        bot_id: Some("B1".to_string()),
        ..message("C1", "2000", "UAUTHOR", "<@U1>")
    };
    process_mention_message(&from_bot, &config, &db, &chat).await.unwrap();

    // The bot's own reminders mention people too.
    process_mention_message(&message("C1", "3000", "UBOT", "<@U1> :wave: Friendly reminder"), &config, &db, &chat).await.unwrap();

    for ts in ["1000", "2000", "3000"] {
        assert!(db.get_mention_obligation("C1", ts).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_mention_sweep_reminds_in_thread() {
    let mut mock = get_mock_chat();
    resolve_users(&mut mock, &[], &[]);
    let outbox = record_posts(&mut mock);

    let (config, db, chat) = setup_test_environment(mock).await;

    process_mention_message(&message("C1", "1000", "UAUTHOR", "<@U2> and <@U1>, see above"), &config, &db, &chat).await.unwrap();

    let notifier = Notifier::new(chat.clone(), config.notification_pause);

    // Not yet due.
    let report = run_mention_sweep(&db, &notifier, at(173_799)).await.unwrap();
    assert_eq!(report.expired, 0);
    assert!(outbox.lock().unwrap().is_empty());

    let report = run_mention_sweep(&db, &notifier, at(173_800)).await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.sent, 1);

    let sent = outbox.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "C1");
    assert_eq!(sent[0].1, "1000");
    assert!(sent[0].2.starts_with("<@U1> <@U2> "));

    // Expired rows are gone, so a second pass sends nothing.
    let report = run_mention_sweep(&db, &notifier, at(173_900)).await.unwrap();
    assert_eq!(report, Default::default());
    assert_eq!(outbox.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_mention_sweep_continues_after_failed_send() {
    let mut mock = get_mock_chat();
    resolve_users(&mut mock, &[], &[]);

    let attempts: Outbox = Arc::default();
    let sink = attempts.clone();
    mock.expect_post_message().returning(move |channel_id, thread_ts, text| {
        sink.lock().unwrap().push((channel_id.to_string(), thread_ts.to_string(), text.to_string()));

        if channel_id == "C1" {
            return Err(anyhow::anyhow!("channel_not_found"));
        }

        Ok(MessageRef {
            channel_id: channel_id.to_string(),
            ts: "9999.000001".to_string(),
        })
    });

    let (config, db, chat) = setup_test_environment(mock).await;

    process_mention_message(&message("C1", "1000", "UAUTHOR", "<@U1>"), &config, &db, &chat).await.unwrap();
    process_mention_message(&message("C2", "1000", "UAUTHOR", "<@U1>"), &config, &db, &chat).await.unwrap();

    let notifier = Notifier::new(chat.clone(), config.notification_pause);
    let report = run_mention_sweep(&db, &notifier, at(173_800)).await.unwrap();

    assert_eq!(report.expired, 2);
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(attempts.lock().unwrap().len(), 2);

    // A failed send is not retried.
    assert!(db.get_mention_obligation("C1", "1000").await.unwrap().is_none());
    assert!(db.get_mention_obligation("C2", "1000").await.unwrap().is_none());
}

// Acknowledgments.

#[tokio::test]
async fn test_reaction_dropped_when_lookup_fails() {
    let mut mock = get_mock_chat();
    resolve_users(&mut mock, &[], &[]);
    mock.expect_fetch_message_at().returning(|_, _, _| Err(anyhow::anyhow!("ratelimited")));

    let (config, db, chat) = setup_test_environment(mock).await;

    process_mention_message(&message("C1", "1000", "UAUTHOR", "<@U1>"), &config, &db, &chat).await.unwrap();
    process_reaction_added(&reaction("C1", "1000", "U1", "eyes"), &config, &db, &chat).await.unwrap();

    let obligation = db.get_mention_obligation("C1", "1000").await.unwrap().unwrap();
    assert_eq!(obligation.nonresponder_ids, vec!["U1".to_string()]);
}

#[tokio::test]
async fn test_reaction_on_untracked_message_touches_nothing() {
    let mut mock = get_mock_chat();
    history_returns(&mut mock, "lunch?", "UAUTHOR");

    let (config, db, chat) = setup_test_environment(mock).await;

    process_reaction_added(&reaction("C1", "1000", "U1", "pizza"), &config, &db, &chat).await.unwrap();

    assert!(db.get_mention_obligation("C1", "1000").await.unwrap().is_none());
    assert!(db.get_announcement_obligation("C1", "1000").await.unwrap().is_none());
}

// Announcements.

#[tokio::test]
async fn test_announcement_reminds_everyone_but_responders() {
    let mut mock = get_mock_chat();
    history_returns(&mut mock, "<!channel> all hands at noon", "UBOSS");
    mock.expect_list_non_bot_users()
        .returning(|| Ok(["UBOSS", "UX", "UY", "UZ"].into_iter().map(String::from).collect()));
    mock.expect_get_permalink()
        .returning(|channel_id, ts| Ok(format!("https://example.slack.com/archives/{channel_id}/p{ts}")));
    let outbox = record_posts(&mut mock);

    let (config, db, chat) = setup_test_environment(mock).await;

    process_announcement_message(&message("CGENERAL", "5000", "UBOSS", "<!channel> all hands at noon"), &config, &db, &chat).await.unwrap();

    let obligation = db.get_announcement_obligation("CGENERAL", "5000").await.unwrap().expect("obligation should exist");
    assert_eq!(obligation.remind_time, at(5_060));
    assert_eq!(obligation.responder_ids, vec!["UBOSS".to_string()]);

    // Duplicate reactions never duplicate a responder.
    process_reaction_added(&reaction("CGENERAL", "5000", "UZ", "white_check_mark"), &config, &db, &chat).await.unwrap();
    process_reaction_added(&reaction("CGENERAL", "5000", "UZ", "thumbsup"), &config, &db, &chat).await.unwrap();

    let obligation = db.get_announcement_obligation("CGENERAL", "5000").await.unwrap().unwrap();
    assert_eq!(obligation.responder_ids, vec!["UBOSS".to_string(), "UZ".to_string()]);

    let notifier = Notifier::new(chat.clone(), config.notification_pause);

    let report = run_announcement_sweep(&db, &notifier, at(5_059)).await.unwrap();
    assert_eq!(report.expired, 0);

    let report = run_announcement_sweep(&db, &notifier, at(5_060)).await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.sent, 2);

    let sent = outbox.lock().unwrap().clone();
    let recipients = sent.iter().map(|(channel_id, _, _)| channel_id.as_str()).collect::<Vec<_>>();
    assert_eq!(recipients, vec!["UX", "UY"]);
    assert!(sent.iter().all(|(_, thread_ts, text)| thread_ts.is_empty() && text.contains("/archives/CGENERAL/p5000")));

    assert!(db.get_announcement_obligation("CGENERAL", "5000").await.unwrap().is_none());
}

#[tokio::test]
async fn test_announcement_falls_back_to_channel_without_permalink() {
    let mut mock = get_mock_chat();
    mock.expect_list_non_bot_users().returning(|| Ok(["UBOSS", "UX"].into_iter().map(String::from).collect()));
    mock.expect_get_permalink().returning(|_, _| Err(anyhow::anyhow!("message_not_found")));
    let outbox = record_posts(&mut mock);

    let (config, db, chat) = setup_test_environment(mock).await;

    process_announcement_message(&message("CGENERAL", "5000", "UBOSS", "<!channel> heads up"), &config, &db, &chat).await.unwrap();

    let notifier = Notifier::new(chat.clone(), config.notification_pause);
    let report = run_announcement_sweep(&db, &notifier, at(6_000)).await.unwrap();
    assert_eq!(report.sent, 1);

    let sent = outbox.lock().unwrap().clone();
    assert_eq!(sent[0].0, "UX");
    assert!(sent[0].2.contains("<#CGENERAL>"));
}

#[tokio::test]
async fn test_announcement_sweep_skips_row_when_roster_fails() {
    let mut mock = get_mock_chat();
    mock.expect_list_non_bot_users().returning(|| Err(anyhow::anyhow!("ratelimited")));
    mock.expect_post_message().never();

    let (config, db, chat) = setup_test_environment(mock).await;

    process_announcement_message(&message("CGENERAL", "5000", "UBOSS", "<!channel> heads up"), &config, &db, &chat).await.unwrap();

    let notifier = Notifier::new(chat.clone(), config.notification_pause);
    let report = run_announcement_sweep(&db, &notifier, at(6_000)).await.unwrap();

    assert_eq!(report.expired, 1);
    assert_eq!(report.sent, 0);
    assert!(db.get_announcement_obligation("CGENERAL", "5000").await.unwrap().is_none());
}

#[tokio::test]
async fn test_announcement_ignores_other_senders_and_channels() {
    let mock = get_mock_chat();

    let (config, db, chat) = setup_test_environment(mock).await;

    process_announcement_message(&message("CGENERAL", "5000", "UX", "<!channel> free cake"), &config, &db, &chat).await.unwrap();
    process_announcement_message(&message("CRANDOM", "5000", "UBOSS", "<!channel> free cake"), &config, &db, &chat).await.unwrap();

    assert!(db.get_announcement_obligation("CGENERAL", "5000").await.unwrap().is_none());
    assert!(db.get_announcement_obligation("CRANDOM", "5000").await.unwrap().is_none());
}

// Routing.

/// Wait for a mention obligation to show up, since routed handlers run on spawned tasks.
async fn wait_for_mention_obligation(db: &DbClient, channel_id: &str, message_ts: &str, max_attempts: u32) -> Res<MentionObligation> {
    for _ in 0..max_attempts {
        if let Some(obligation) = db.get_mention_obligation(channel_id, message_ts).await? {
            return Ok(obligation);
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    Err(anyhow::anyhow!("Timeout waiting for mention obligation"))
}

#[tokio::test]
async fn test_routed_message_is_tracked_on_both_paths() {
    let mut mock = get_mock_chat();
    resolve_users(&mut mock, &[], &[]);

    let (config, db, chat) = setup_test_environment(mock).await;

    route_message_event(message("CGENERAL", "7000", "UBOSS", "<!channel> <@U1> owns the rollout"), config.clone(), db.clone(), chat.clone());

    let obligation = wait_for_mention_obligation(&db, "CGENERAL", "7000", 100).await.expect("mention should be tracked");
    assert_eq!(obligation.nonresponder_ids, vec!["U1".to_string()]);

    let mut announcement = None;
    for _ in 0..100 {
        announcement = db.get_announcement_obligation("CGENERAL", "7000").await.unwrap();
        if announcement.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(announcement.expect("announcement should be tracked").responder_ids, vec!["UBOSS".to_string()]);
}

// Pacing.

#[tokio::test(start_paused = true)]
async fn test_sweeps_pause_between_sends() {
    let pause = Duration::from_secs(1);

    let mut db = MockDb::new();
    db.expect_delete_resolved_mention_obligations().returning(|| Ok(0));
    db.expect_take_expired_mention_obligations().returning(|_| {
        Ok(["C1", "C2"]
            .into_iter()
            .map(|channel_id| MentionObligation {
                channel_id: channel_id.to_string(),
                message_ts: "1000".to_string(),
                remind_time: at(173_800),
                nonresponder_ids: vec!["U1".to_string()],
            })
            .collect())
    });
    db.expect_take_expired_announcement_obligations().returning(|_| {
        Ok(vec![AnnouncementObligation {
            channel_id: "CGENERAL".to_string(),
            message_ts: "5000".to_string(),
            remind_time: at(5_060),
            responder_ids: vec!["UBOSS".to_string()],
        }])
    });
    let db = DbClient { inner: Arc::new(db) };

    let mut mock = get_mock_chat();
    mock.expect_list_non_bot_users()
        .returning(|| Ok(["UBOSS", "UX", "UY", "UZ"].into_iter().map(String::from).collect()));
    mock.expect_get_permalink().returning(|_, _| Ok("https://example.slack.com/archives/CGENERAL/p5000".to_string()));

    let sent_at: Arc<Mutex<Vec<tokio::time::Instant>>> = Arc::default();
    let sink = sent_at.clone();
    mock.expect_post_message().returning(move |channel_id, _, _| {
        sink.lock().unwrap().push(tokio::time::Instant::now());

        Ok(MessageRef {
            channel_id: channel_id.to_string(),
            ts: "9999.000001".to_string(),
        })
    });

    let notifier = Notifier::new(ChatClient::new(Arc::new(mock)), pause);

    // Mentions: the first reminder goes out at once, the second one pause later.
    let started = tokio::time::Instant::now();
    let report = run_mention_sweep(&db, &notifier, at(200_000)).await.unwrap();
    assert_eq!(report.sent, 2);

    let mention_sends = std::mem::take(&mut *sent_at.lock().unwrap());
    assert_eq!(mention_sends.len(), 2);
    assert!(mention_sends[0] - started < pause);
    assert!(mention_sends[1] - mention_sends[0] >= pause);

    // Announcements: every direct message, the first included, waits a pause.
    let started = tokio::time::Instant::now();
    let report = run_announcement_sweep(&db, &notifier, at(6_000)).await.unwrap();
    assert_eq!(report.sent, 3);

    let dm_sends = sent_at.lock().unwrap().clone();
    assert_eq!(dm_sends.len(), 3);
    assert!(dm_sends[0] - started >= pause);
    assert!(dm_sends.windows(2).all(|pair| pair[1] - pair[0] >= pause));
}
