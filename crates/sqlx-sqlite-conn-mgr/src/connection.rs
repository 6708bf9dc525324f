//! Opening and closing individual engine connections

use sqlx::Connection;
use sqlx::sqlite::SqliteConnection;
use tracing::debug;

use crate::config::{ConnectionOptions, PrepareFn};
use crate::{Error, Result};

/// True when `conn` has no transaction open.
pub async fn in_autocommit(conn: &mut SqliteConnection) -> Result<bool> {
   let mut handle = conn.lock_handle().await?;
   let raw = handle.as_raw_handle().as_ptr();
   // SAFETY: the locked handle is a live connection with no statement running
   Ok(unsafe { libsqlite3_sys::sqlite3_get_autocommit(raw) } != 0)
}

/// Open one engine connection with the given flags.
///
/// Any engine failure here is reported as [`Error::Open`] so callers can tell
/// an unreachable database apart from a failing statement.
pub async fn open(options: &ConnectionOptions) -> Result<SqliteConnection> {
   let connect_options = options.to_connect_options()?;

   let conn = SqliteConnection::connect_with(&connect_options)
      .await
      .map_err(|source| Error::Open {
         location: options.location.to_string(),
         source,
      })?;

   debug!(
      location = %options.location,
      read_only = options.read_only,
      "Opened SQLite connection"
   );
   Ok(conn)
}

/// Open a connection and run the preparation callback on it before anyone
/// else can see it. The connection is closed again if preparation fails.
pub async fn open_prepared(
   options: &ConnectionOptions,
   prepare: Option<&PrepareFn>,
) -> Result<SqliteConnection> {
   let mut conn = open(options).await?;

   if let Some(prepare) = prepare
      && let Err(err) = prepare(&mut conn).await
   {
      if let Err(close_err) = conn.close().await {
         debug!(error = %close_err, "Failed to close connection after preparation error");
      }
      return Err(err);
   }

   Ok(conn)
}
