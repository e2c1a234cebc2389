//! Core components, types, and utilities for the nag-bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Common types and result handling.
//! - The repeating-task primitive the sweeps run on.

pub mod config;
pub mod schedule;
pub mod types;
