//! # pathwise-store
//!
//! Repository kernel for the Pathwise learning backend: a uniform,
//! transaction-aware persistence layer over `SQLite`.
//!
//! - **Store**: pooled database handle plus the clock every write reads
//!   ([`Store`]).
//! - **Database context**: [`Dbc`] carries the executor (pool or open
//!   transaction), a cancellation token and an optional deadline.
//! - **Transactions**: [`Store::transact`] with commit/rollback semantics and
//!   outermost reuse ([`TxOptions`]).
//! - **Repo template**: [`Repo<E>`] gives every [`Entity`] create, get,
//!   upsert, update, soft delete and full delete.
//! - **Entities**: paths, path nodes, activities, concepts and their links,
//!   user events, cursors, mastery state and taxonomy snapshots
//!   ([`entities`]).
//! - **Event streams**: cursor-driven consumption ([`stream`]).
//! - **Migrations**: embedded schema applied on open ([`sqlite::migrations`]).

#![deny(unsafe_code)]

pub mod dbc;
pub mod entities;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod sqlite;
pub mod store;
pub mod stream;
pub mod template;
pub mod time;
pub mod tx;

#[cfg(test)]
mod testutil;

pub use dbc::Dbc;
pub use errors::{ErrorKind, Result, StoreError};
pub use ids::{Id, new_id, redact_id};
pub use logging::RepoLogger;
pub use store::Store;
pub use stream::{EventConsumer, PageOutcome};
pub use template::{BaseRecord, Entity, Fields, Repo, RepoConfig, SoftDeletable};
pub use time::{Clock, ManualClock, SystemClock};
pub use tx::TxOptions;

pub use pathwise_settings::{Isolation, StoreSettings};
