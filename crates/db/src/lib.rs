//! SQLite persistence for the fulfillment engine: connection setup, the
//! reversible schema migrations, and SQL plus in-memory implementations of
//! the store ports declared in `promissory-core`.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
