//! Configuration for SQLite connections, queues and pools

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};

use crate::Result;

/// Callback run exactly once on every newly opened connection, before the
/// connection is first used. Typical uses are PRAGMAs and session setup.
///
/// # Examples
///
/// ```
/// use sqlx_sqlite_conn_mgr::{PrepareFn, prepare_fn};
///
/// let prepare: PrepareFn = prepare_fn(|conn| {
///    Box::pin(async move {
///       sqlx::query("PRAGMA cache_size = -2000").execute(&mut *conn).await?;
///       Ok(())
///    })
/// });
/// ```
pub type PrepareFn =
   Arc<dyn for<'c> Fn(&'c mut SqliteConnection) -> BoxFuture<'c, Result<()>> + Send + Sync>;

/// Box a closure as a [`PrepareFn`]
pub fn prepare_fn<F>(f: F) -> PrepareFn
where
   F: for<'c> Fn(&'c mut SqliteConnection) -> BoxFuture<'c, Result<()>> + Send + Sync + 'static,
{
   Arc::new(f)
}

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageLocation {
   /// A database file on disk
   File(PathBuf),

   /// A named, shared-cache in-memory database. Every connection opened from
   /// the same `InMemory` value sees the same data for as long as at least
   /// one of them stays open.
   InMemory(String),

   /// A private temporary database that only the opening connection can see
   Temporary,
}

impl StorageLocation {
   /// A file-backed location
   pub fn file(path: impl AsRef<Path>) -> Self {
      StorageLocation::File(path.as_ref().to_path_buf())
   }

   /// A fresh in-memory database with a unique name
   pub fn in_memory() -> Self {
      StorageLocation::InMemory(format!("sqlite-access-{}", uuid::Uuid::new_v4()))
   }

   /// The on-disk path, if any
   pub fn path(&self) -> Option<&Path> {
      match self {
         StorageLocation::File(path) => Some(path),
         _ => None,
      }
   }

   /// Whether separate connections can observe the same data
   pub fn is_shareable(&self) -> bool {
      !matches!(self, StorageLocation::Temporary)
   }
}

impl fmt::Display for StorageLocation {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         StorageLocation::File(path) => write!(f, "{}", path.display()),
         StorageLocation::InMemory(name) => write!(f, ":memory:{name}"),
         StorageLocation::Temporary => f.write_str("temporary"),
      }
   }
}

impl From<PathBuf> for StorageLocation {
   fn from(path: PathBuf) -> Self {
      StorageLocation::File(path)
   }
}

impl From<&Path> for StorageLocation {
   fn from(path: &Path) -> Self {
      StorageLocation::file(path)
   }
}

impl From<&str> for StorageLocation {
   fn from(path: &str) -> Self {
      StorageLocation::file(path)
   }
}

/// Journal mode applied when a read-write connection is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
   Wal,
   Delete,
}

impl From<JournalMode> for SqliteJournalMode {
   fn from(mode: JournalMode) -> Self {
      match mode {
         JournalMode::Wal => SqliteJournalMode::Wal,
         JournalMode::Delete => SqliteJournalMode::Delete,
      }
   }
}

/// Flags for opening a single engine connection
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
   pub location: StorageLocation,

   /// Open with `SQLITE_OPEN_READONLY`
   pub read_only: bool,

   /// Create the database file if it does not exist (ignored when read-only)
   pub create_if_missing: bool,

   /// Use SQLite's serialized (full mutex) threading mode instead of
   /// multi-thread mode
   pub serialized: bool,

   /// Open with `SQLITE_OPEN_SHAREDCACHE`. In-memory locations always use a
   /// shared cache regardless of this flag.
   pub shared_cache: bool,

   /// How long the engine retries when a table is locked
   pub busy_timeout: Duration,

   /// Trace every executed statement through the `log` facade at debug level
   pub log_statements: bool,

   /// Journal mode to set on open; `None` leaves the database as it is
   pub journal_mode: Option<JournalMode>,
}

impl ConnectionOptions {
   /// Options for a read-write connection to `location`
   pub fn new(location: impl Into<StorageLocation>) -> Self {
      Self {
         location: location.into(),
         read_only: false,
         create_if_missing: true,
         serialized: false,
         shared_cache: false,
         busy_timeout: Duration::from_secs(5),
         log_statements: false,
         journal_mode: None,
      }
   }

   /// The same options, opened read-only
   pub fn into_read_only(mut self) -> Self {
      self.read_only = true;
      self.create_if_missing = false;
      self.journal_mode = None;
      self
   }

   /// Build the SQLx options for these flags
   pub fn to_connect_options(&self) -> Result<SqliteConnectOptions> {
      let mut options = match &self.location {
         StorageLocation::File(path) => SqliteConnectOptions::new().filename(path),
         StorageLocation::InMemory(name) => {
            SqliteConnectOptions::from_str(&format!("sqlite:file:{name}?mode=memory&cache=shared"))?
         }
         // An empty filename asks SQLite for a private temporary database
         StorageLocation::Temporary => SqliteConnectOptions::new().filename(""),
      };

      options = options
         .read_only(self.read_only)
         .create_if_missing(self.create_if_missing && !self.read_only)
         .serialized(self.serialized)
         .busy_timeout(self.busy_timeout);

      if self.shared_cache {
         options = options.shared_cache(true);
      }

      if let Some(mode) = self.journal_mode
         && !self.read_only
      {
         options = options.journal_mode(mode.into());
      }

      options = if self.log_statements {
         options.log_statements(log::LevelFilter::Debug)
      } else {
         options.disable_statement_logging()
      };

      Ok(options)
   }
}

/// Configuration for [`SqliteDatabase`](crate::SqliteDatabase) and
/// [`ConnectionPool`](crate::ConnectionPool)
///
/// # Examples
///
/// ```
/// use sqlx_sqlite_conn_mgr::SqliteDatabaseConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = SqliteDatabaseConfig::default();
///
/// // Override just one field
/// let config = SqliteDatabaseConfig {
///     drain_delay: Duration::from_millis(100),
///     ..Default::default()
/// };
/// ```
#[derive(Clone)]
pub struct SqliteDatabaseConfig {
   /// Quiet period after a read completes before idle read connections are
   /// closed down to one
   ///
   /// Default: 1 second
   pub drain_delay: Duration,

   /// Busy timeout applied to every connection
   ///
   /// Default: 5 seconds
   pub busy_timeout: Duration,

   /// Use serialized threading mode for every connection
   ///
   /// Default: false
   pub serialized: bool,

   /// Open file-backed connections with a shared cache
   ///
   /// Default: false
   pub shared_cache: bool,

   /// Log every statement at debug level
   ///
   /// Default: false
   pub log_statements: bool,

   /// Run once on every connection the database opens, writer included
   pub prepare: Option<PrepareFn>,
}

impl SqliteDatabaseConfig {
   /// Connection flags for `location` under this configuration
   pub fn connection_options(&self, location: StorageLocation) -> ConnectionOptions {
      ConnectionOptions {
         serialized: self.serialized,
         shared_cache: self.shared_cache,
         busy_timeout: self.busy_timeout,
         log_statements: self.log_statements,
         ..ConnectionOptions::new(location)
      }
   }
}

impl Default for SqliteDatabaseConfig {
   fn default() -> Self {
      Self {
         drain_delay: Duration::from_secs(1),
         busy_timeout: Duration::from_secs(5),
         serialized: false,
         shared_cache: false,
         log_statements: false,
         prepare: None,
      }
   }
}

impl fmt::Debug for SqliteDatabaseConfig {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("SqliteDatabaseConfig")
         .field("drain_delay", &self.drain_delay)
         .field("busy_timeout", &self.busy_timeout)
         .field("serialized", &self.serialized)
         .field("shared_cache", &self.shared_cache)
         .field("log_statements", &self.log_statements)
         .field("prepare", &self.prepare.is_some())
         .finish()
   }
}
