//! Error type for registry operations

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from a database operation.
   #[error(transparent)]
   Toolkit(#[from] sqlx_sqlite_toolkit::Error),

   /// No database is loaded at this location.
   #[error("database not loaded: {0}")]
   DatabaseNotLoaded(String),
}

impl From<sqlx_sqlite_conn_mgr::Error> for Error {
   fn from(err: sqlx_sqlite_conn_mgr::Error) -> Self {
      Error::Toolkit(err.into())
   }
}

impl From<sqlx_sqlite_observer::Error> for Error {
   fn from(err: sqlx_sqlite_observer::Error) -> Self {
      Error::Toolkit(err.into())
   }
}

impl Error {
   /// Machine-readable error code.
   pub fn error_code(&self) -> String {
      match self {
         Error::Toolkit(e) => e.error_code(),
         Error::DatabaseNotLoaded(_) => "DATABASE_NOT_LOADED".to_string(),
      }
   }
}
