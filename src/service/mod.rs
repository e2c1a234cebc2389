//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services used by the nag-bot:
//! - Chat services (e.g., Slack)
//! - Database services (e.g., SurrealDB)
//! - The notifier that wraps outbound reminder calls
//!
//! The chat and database modules define both generic traits and concrete
//! implementations, allowing for extensibility and easy testing.

pub mod chat;
pub mod db;
pub mod notifier;
