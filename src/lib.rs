//! Library root for `nag-bot`.
//!
//! Nag-bot keeps people accountable in Slack:
//! - When a message mentions users, each of them owes the message a reaction
//! - When the configured sender broadcasts to the configured channel, everyone
//!   in the workspace owes the announcement a reaction
//! - Once the deadline passes, whoever has not reacted gets a reminder
//!
//! The bot integrates with Slack for chat and SurrealDB for storage. The
//! architecture is built around extensible traits that allow for different
//! implementations of each service.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the nag-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with database and chat clients
/// - Starts the sweep loops and the main event loop
pub async fn start(config: Config) -> Void {
    info!("Starting nag-bot ...");

    // Start the crypto provider.
    crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install the default crypto provider."))?;

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
