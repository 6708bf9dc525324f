//! # sqlx-sqlite-observer
//!
//! Commit-time change notifications for databases managed by
//! `sqlx-sqlite-conn-mgr`.
//!
//! SQLite's update hook reports each row change on the writer connection.
//! Changes to observed tables are buffered until the commit hook fires and
//! then broadcast to every subscriber; the rollback hook discards them.
//!
//! - **[`ObservableSqliteDatabase`]**: installs the hooks and hands out
//!   subscriptions
//! - **[`TableChange`]**: table, operation and rowid of one committed change
//! - **[`TableChangeStream`]**: `Stream` view of a subscription with optional
//!   table filtering

mod broker;
mod change;
mod config;
mod conn_mgr;
mod error;
mod hooks;
mod stream;

pub use broker::ObservationBroker;
pub use change::{ChangeOperation, TableChange, TableChangeEvent};
pub use config::{DEFAULT_CHANNEL_CAPACITY, ObserverConfig};
pub use conn_mgr::ObservableSqliteDatabase;
pub use error::{Error, Result};
pub use stream::{TableChangeStream, TableChangeStreamExt};
