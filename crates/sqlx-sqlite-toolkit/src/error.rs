/// Result type alias for toolkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for SQLite toolkit operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from SQLx operations.
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// Error from the connection manager.
   #[error(transparent)]
   ConnectionManager(#[from] sqlx_sqlite_conn_mgr::Error),

   /// SQLite type that cannot be mapped to a [`Value`](crate::Value).
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// A value could not be converted to the requested Rust type.
   #[error("type mismatch: expected {expected}, found {found}")]
   TypeMismatch {
      expected: &'static str,
      found: &'static str,
   },

   /// No column with this name in the row.
   #[error("no column named '{0}'")]
   ColumnNotFound(String),

   /// Column position past the end of the row.
   #[error("column index {index} out of range for row of {len} columns")]
   ColumnIndexOutOfRange { index: usize, len: usize },

   /// Multiple rows returned from fetchOne query.
   #[error("fetchOne() query returned {0} rows, expected 0 or 1")]
   MultipleRowsReturned(usize),

   /// Error from the observer (change notifications).
   #[cfg(feature = "observer")]
   #[error(transparent)]
   Observer(#[from] sqlx_sqlite_observer::Error),

   /// I/O error when accessing database files.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),

   /// Generic error for operations that don't fit other categories.
   #[error("{0}")]
   Other(String),
}

impl Error {
   /// The SQLite result code behind this error, if the engine reported one.
   pub fn sqlite_code(&self) -> Option<String> {
      match self {
         Error::Sqlx(e) => e
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code.into_owned()),
         Error::ConnectionManager(e) => e.sqlite_code(),
         _ => None,
      }
   }

   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      if let Some(code) = self.sqlite_code() {
         return format!("SQLITE_{}", code);
      }

      match self {
         Error::Sqlx(_) => "SQLX_ERROR".to_string(),
         Error::ConnectionManager(e) if e.is_open_failure() => "OPEN_ERROR".to_string(),
         Error::ConnectionManager(sqlx_sqlite_conn_mgr::Error::DatabaseClosed) => {
            "DATABASE_CLOSED".to_string()
         }
         Error::ConnectionManager(_) => "CONNECTION_ERROR".to_string(),
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
         Error::TypeMismatch { .. } => "TYPE_MISMATCH".to_string(),
         Error::ColumnNotFound(_) => "COLUMN_NOT_FOUND".to_string(),
         Error::ColumnIndexOutOfRange { .. } => "COLUMN_INDEX_OUT_OF_RANGE".to_string(),
         Error::MultipleRowsReturned(_) => "MULTIPLE_ROWS_RETURNED".to_string(),
         #[cfg(feature = "observer")]
         Error::Observer(_) => "OBSERVER_ERROR".to_string(),
         Error::Io(_) => "IO_ERROR".to_string(),
         Error::Other(_) => "ERROR".to_string(),
      }
   }
}
