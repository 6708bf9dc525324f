//! Error types for the sqlx-sqlite-observer crate.

/// Errors that can occur during observation operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Failed to register SQLite hooks.
   #[error("Hook registration failed: {0}")]
   HookRegistration(String),

   /// SQLx database error.
   #[error("Database error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// Error from the connection manager that owns the writer.
   #[error(transparent)]
   ConnMgr(#[from] sqlx_sqlite_conn_mgr::Error),
}

/// Result type alias for observer operations.
pub type Result<T> = std::result::Result<T, Error>;
