#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! PostgreSQL connection setup for the support desk.
//!
//! Opens TLS connections from a `DATABASE_URL`-style descriptor and wraps
//! them in the [`support_desk_analytics::ConnectionProvider`]
//! implementations the executor borrows from.

pub mod config;
pub mod db;
pub mod providers;

pub use config::DatabaseConfig;
pub use providers::{ConnectPerRequest, ConnectionMode, build_provider};

/// Errors that can occur while setting up database connections.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// The connection descriptor could not be parsed or the connection
    /// could not be opened.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of what went wrong.
        message: String,
    },
}
