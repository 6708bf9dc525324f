//! # sqlx-sqlite-conn-mgr
//!
//! Serialized connections and an adaptive read pool for SQLite on top of SQLx.
//!
//! ## Core Types
//!
//! - **[`ConnectionQueue`]**: one connection that runs submitted closures one
//!   at a time, in order, with transaction and savepoint helpers
//! - **[`ConnectionPool`]**: read-only connections that grow with concurrent
//!   demand and drain back to one after a quiet period
//! - **[`SqliteDatabase`]**: a writer queue plus a read pool behind one handle
//! - **[`SqliteDatabaseConfig`]** / **[`ConnectionOptions`]**: settings
//! - **[`Error`]**: Error type for database operations
//!
//! ## Architecture
//!
//! - **Serial writes**: every write goes through a single queued connection
//! - **Concurrent reads**: each read gets a connection no one else is using
//! - **Idle drain**: extra readers are closed once nothing has been released
//!   for `drain_delay` and no reader is busy
//! - **WAL**: file databases are switched to WAL so readers and the writer do
//!   not block each other

mod config;
mod connection;
mod database;
mod error;
mod pool;
mod queue;
mod transaction;

// Re-export public types
pub use config::{
   ConnectionOptions, JournalMode, PrepareFn, SqliteDatabaseConfig, StorageLocation, prepare_fn,
};
pub use connection::{in_autocommit, open, open_prepared};
pub use database::SqliteDatabase;
pub use error::{Error, Result};
pub use futures::future::BoxFuture;
pub use pool::{ConnectionPool, PoolStatus};
pub use queue::ConnectionQueue;
pub use transaction::{TransactionKind, quote_identifier, quote_literal};
