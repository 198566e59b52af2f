//! novo-rs: JSON REST backend for a manga and web-novel reading platform.
//!
//! Readers browse book groups (series), read chapters that are either
//! hypertext or an ordered list of images, vote and comment. Uploaders
//! manage their own groups and chapters; roles grant `module.action`
//! permissions for everything else.
//!
//! # Features
//!
//! - User accounts, sessions and role-based permissions
//! - Authors and book groups with cover art
//! - Hypertext and image chapters with per-day view counters
//! - Likes, dislikes and comments
//! - Listings, per-user groups and view rankings
//! - Image metadata registry (files live in external storage)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and user management.
pub mod auth;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Domain operations.
pub mod library;
/// HTTP server.
pub mod server;
/// Input validation.
pub mod validation;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
