//! Runtime services and shared state for the nag-bot.

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::{
    base::{
        config::Config,
        schedule::spawn_repeating,
        types::{Res, Void},
    },
    interaction::sweep::{run_announcement_sweep, run_mention_sweep},
    service::{chat::ChatClient, db::DbClient, notifier::Notifier},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the database client, chat client, and configuration.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The database client instance.
    pub db: DbClient,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the database.
        let db = DbClient::surreal(&config).await?;

        // Initialize the slack client.
        let chat = ChatClient::slack(&config, db.clone()).await?;

        Ok(Self { config, db, chat })
    }

    /// The notifier used by the sweeps.
    pub fn notifier(&self) -> Notifier {
        Notifier::new(self.chat.clone(), self.config.notification_pause)
    }

    /// Spawns the sweep loops for every enabled feature.
    pub fn spawn_sweeps(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if self.config.mention_tracking_enabled {
            let db = self.db.clone();
            let notifier = self.notifier();

            handles.push(spawn_repeating("mention_sweep", self.config.mention_sweep_interval, move || {
                let db = db.clone();
                let notifier = notifier.clone();

                async move { run_mention_sweep(&db, &notifier, Utc::now()).await.map(|_| ()) }
            }));
        }

        if self.config.announcement_tracking_enabled {
            let db = self.db.clone();
            let notifier = self.notifier();

            handles.push(spawn_repeating("announcement_sweep", self.config.announcement_sweep_interval, move || {
                let db = db.clone();
                let notifier = notifier.clone();

                async move { run_announcement_sweep(&db, &notifier, Utc::now()).await.map(|_| ()) }
            }));
        }

        info!("Started {} sweep task(s).", handles.len());

        handles
    }

    /// Start the sweeps, then listen for chat events until shutdown.
    pub async fn start(&self) -> Void {
        let sweeps = self.spawn_sweeps();

        let result = self.chat.start().await;

        // The listener has exited; stop the sweeps with it.
        for sweep in sweeps {
            sweep.abort();
        }

        result
    }
}
