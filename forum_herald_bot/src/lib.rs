//! Source code for Forum Herald Bot, a Telegram bot that pings people about new
//! forum topics and competition submissions they care about.

/// Various types used throughout.
pub mod types;

/// Settings from the environment.
pub mod config;

/// Error type of handlers and background loops.
pub mod error;

/// The database.
pub mod database;

/// Miscellaneous functions.
mod misc;

/// Functions that perform stuff via the bot.
mod actions;

/// Following topic authors.
pub mod author_follow;

/// What's new with the authors someone follows.
pub mod profile;

/// Per-chat subscriptions to new topics, filtered by keywords.
pub mod subscription;

/// Following competitions for new submissions.
pub mod competition;

/// Bookmarked topics.
pub mod favorites;

/// Keeping track of who's active in which topic.
pub mod scanner;

/// Periodic database snapshots.
pub mod backup;

/// Per-user command cooldowns.
pub mod cooldown;

/// Menus made of inline keyboards.
mod views;

/// Functions that handle events from Telegram.
mod handlers;

/// Entry function that starts the bot.
mod entry;
pub use entry::*;
