//! `SQLite` backend.
//!
//! - **[`connection`]**: `r2d2` pool with WAL, foreign keys and busy timeout
//!   applied to every connection.
//! - **[`migrations`]**: embedded, version-tracked schema.
//! - **[`columns`]**: value binding and sequential row decoding.
//! - **[`query`]**: `WHERE` builder and list-limit clamping.
//! - `engine`: insert, ignore-duplicates and upsert statements built from
//!   entity column lists.

pub mod columns;
pub mod connection;
pub(crate) mod engine;
pub mod migrations;
pub mod query;

pub use connection::{ConnectionPool, PooledConnection, PragmaState, new_pool, verify_pragmas};
pub use migrations::{current_version, latest_version, run_migrations};
