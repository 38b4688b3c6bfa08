#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Embedded SQLite store for properties, signals, and run bookkeeping.
//!
//! One database file holds everything (`data/distressed.db`). The write
//! surface is a set of idempotent upsert functions in [`store`]; the
//! read surface consumed by external collaborators lives in [`queries`].
//! Connections are opened with WAL journaling and foreign-key enforcement.

pub mod db;
pub mod paths;
pub mod queries;
pub mod store;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error (creating the data directory, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization of a detail payload failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
