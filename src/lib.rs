//! # sqlite-access
//!
//! SQLite access with one serialized writer and an adaptive pool of readers
//! per database, built from three crates:
//!
//! - `sqlx-sqlite-conn-mgr`: connection queues, the read pool and
//!   [`SqliteDatabase`]
//! - `sqlx-sqlite-toolkit`: [`Value`], [`Row`] and [`DatabaseWrapper`]
//! - `sqlx-sqlite-observer`: commit-time change notifications
//!
//! [`DatabaseRegistry`] keeps one open handle per storage location.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use sqlite_access::{Builder, Value};
//!
//! # async fn run() -> sqlite_access::Result<()> {
//! let registry = Builder::new()
//!    .drain_delay(Duration::from_millis(500))
//!    .build();
//!
//! let db = registry.load("app.db", None).await?;
//! db.execute("CREATE TABLE IF NOT EXISTS notes (body TEXT)", vec![]).await?;
//! db.execute("INSERT INTO notes VALUES ($1)", vec![Value::from("hello")])
//!    .await?;
//!
//! for row in db.fetch_all("SELECT body FROM notes", vec![]).await? {
//!    println!("{}", row.try_get::<String, _>("body")?);
//! }
//!
//! registry.close_all().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

mod error;
mod registry;

pub use error::{Error, Result};
pub use registry::DatabaseRegistry;

pub use sqlx_sqlite_conn_mgr::{
   ConnectionOptions, PoolStatus, PrepareFn, SqliteDatabase, SqliteDatabaseConfig, StorageLocation,
   TransactionKind, prepare_fn,
};
pub use sqlx_sqlite_observer::{
   ChangeOperation, ObservableSqliteDatabase, ObserverConfig, TableChange, TableChangeEvent,
   TableChangeStream,
};
pub use sqlx_sqlite_toolkit::{
   DatabaseWrapper, FromValue, Row, Statement, Value, WriteQueryResult,
};

/// Builder for a [`DatabaseRegistry`].
///
/// Settings here become the default [`SqliteDatabaseConfig`] for every
/// database the registry loads without an explicit config.
#[derive(Debug, Default)]
pub struct Builder {
   config: SqliteDatabaseConfig,
}

impl Builder {
   /// Create a new builder instance.
   pub fn new() -> Self {
      Self::default()
   }

   /// Replace the whole default configuration.
   pub fn config(mut self, config: SqliteDatabaseConfig) -> Self {
      self.config = config;
      self
   }

   pub fn drain_delay(mut self, delay: Duration) -> Self {
      self.config.drain_delay = delay;
      self
   }

   pub fn busy_timeout(mut self, timeout: Duration) -> Self {
      self.config.busy_timeout = timeout;
      self
   }

   pub fn log_statements(mut self, enabled: bool) -> Self {
      self.config.log_statements = enabled;
      self
   }

   /// Run `prepare` once on every connection opened by loaded databases.
   pub fn prepare(mut self, prepare: PrepareFn) -> Self {
      self.config.prepare = Some(prepare);
      self
   }

   pub fn build(self) -> DatabaseRegistry {
      DatabaseRegistry::with_config(self.config)
   }
}

/// A registry with default configuration.
pub fn init() -> DatabaseRegistry {
   Builder::new().build()
}
