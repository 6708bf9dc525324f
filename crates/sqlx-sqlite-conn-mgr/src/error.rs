//! Error types for sqlx-sqlite-conn-mgr

use thiserror::Error;

/// Errors that may occur when working with sqlx-sqlite-conn-mgr
#[derive(Error, Debug)]
pub enum Error {
   /// The storage location could not be opened (missing path, permissions,
   /// corruption). Pool bookkeeping is left untouched when this happens.
   #[error("failed to open database at {location}: {source}")]
   Open {
      location: String,
      #[source]
      source: sqlx::Error,
   },

   /// Error from the sqlx library while preparing, binding or stepping a
   /// statement against a valid connection.
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// Error raised by a caller-supplied closure for its own reasons
   #[error("callback failed: {0}")]
   Callback(Box<dyn std::error::Error + Send + Sync>),

   /// The task running a queued closure panicked or was aborted
   #[error("queued task failed: {0}")]
   TaskFailed(#[from] tokio::task::JoinError),

   /// IO error when accessing database files. Standard library IO errors
   /// are converted to this variant.
   #[error("IO error: {0}")]
   Io(#[from] std::io::Error),

   /// Database has been closed and cannot be used
   #[error("Database has been closed")]
   DatabaseClosed,

   /// The storage location cannot be shared between a writer and readers
   #[error("{0} storage is private to one connection and cannot back a shared database")]
   UnsharedStorage(String),
}

impl Error {
   /// Wrap an arbitrary error raised inside a caller's closure.
   pub fn callback<E>(err: E) -> Self
   where
      E: Into<Box<dyn std::error::Error + Send + Sync>>,
   {
      Error::Callback(err.into())
   }

   /// True when the error came from opening a connection.
   pub fn is_open_failure(&self) -> bool {
      matches!(self, Error::Open { .. })
   }

   /// True when the engine rejected a statement on an open connection.
   pub fn is_statement_failure(&self) -> bool {
      matches!(self, Error::Sqlx(_))
   }

   /// The SQLite result code reported by the engine, if any.
   pub fn sqlite_code(&self) -> Option<String> {
      let source = match self {
         Error::Open { source, .. } => source,
         Error::Sqlx(source) => source,
         _ => return None,
      };
      source
         .as_database_error()
         .and_then(|db_err| db_err.code())
         .map(|code| code.into_owned())
   }
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
