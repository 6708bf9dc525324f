//! Serial access to a single connection
//!
//! A [`ConnectionQueue`] owns exactly one engine connection and runs every
//! closure submitted to it one at a time, in submission order. Callers on any
//! number of tasks may submit concurrently; each waits for its own turn.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::Connection;
use sqlx::sqlite::SqliteConnection;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::{ConnectionOptions, PrepareFn};
use crate::connection::{in_autocommit, open_prepared};
use crate::transaction::{COMMIT_SQL, ROLLBACK_SQL, SavepointSql, TransactionKind};
use crate::{Error, Result};

/// One connection behind a FIFO execution context.
///
/// ## Ordering
///
/// Submissions wait on a fair (FIFO) lock. Once a caller holds the lock its
/// closure runs on a dedicated task that owns the lock, so a caller that stops
/// waiting does not leave the connection half-used: the closure still runs to
/// completion before the next submission starts.
///
/// ## Identity
///
/// Equality and hashing use a unique id assigned at construction, never the
/// address of the connection.
pub struct ConnectionQueue {
   id: Uuid,
   conn: Arc<Mutex<SqliteConnection>>,
}

impl ConnectionQueue {
   /// Wrap an already open connection
   pub fn new(conn: SqliteConnection) -> Self {
      Self {
         id: Uuid::new_v4(),
         conn: Arc::new(Mutex::new(conn)),
      }
   }

   /// Open a connection, run the preparation callback on it, and wrap it
   pub async fn open(options: &ConnectionOptions, prepare: Option<&PrepareFn>) -> Result<Self> {
      let conn = open_prepared(options, prepare).await?;
      Ok(Self::new(conn))
   }

   /// Unique identifier of this queue
   pub fn id(&self) -> Uuid {
      self.id
   }

   /// Run `f` against the connection once every earlier submission is done.
   ///
   /// Errors returned by `f` come back unchanged. A panic inside `f` is
   /// reported as [`Error::TaskFailed`].
   ///
   /// # Examples
   ///
   /// ```no_run
   /// # async fn demo(queue: &sqlx_sqlite_conn_mgr::ConnectionQueue) -> sqlx_sqlite_conn_mgr::Result<()> {
   /// let count: i64 = queue
   ///    .execute(|conn| {
   ///       Box::pin(async move {
   ///          let n = sqlx::query_scalar("SELECT count(*) FROM users")
   ///             .fetch_one(&mut *conn)
   ///             .await?;
   ///          Ok(n)
   ///       })
   ///    })
   ///    .await?;
   /// # Ok(())
   /// # }
   /// ```
   pub async fn execute<F, T>(&self, f: F) -> Result<T>
   where
      F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send + 'static,
      T: Send + 'static,
   {
      let mut guard = Arc::clone(&self.conn).lock_owned().await;
      trace!(queue = %self.id, "Running queued closure");

      let task = tokio::spawn(async move { f(&mut *guard).await });
      task.await?
   }

   /// Run `f` between `BEGIN` and `COMMIT` inside a single queued turn.
   ///
   /// If `f` or the commit fails, the transaction is rolled back and the
   /// original error is returned. Rollback failures are logged and dropped.
   pub async fn execute_in_transaction<F, T>(&self, kind: TransactionKind, f: F) -> Result<T>
   where
      F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send + 'static,
      T: Send + 'static,
   {
      let id = self.id;
      self
         .execute(move |conn| {
            Box::pin(async move {
               sqlx::query(kind.begin_sql()).execute(&mut *conn).await?;

               let outcome = match f(&mut *conn).await {
                  Ok(value) => sqlx::query(COMMIT_SQL)
                     .execute(&mut *conn)
                     .await
                     .map(|_| value)
                     .map_err(Error::from),
                  Err(err) => Err(err),
               };

               match outcome {
                  Ok(value) => {
                     debug!(queue = %id, %kind, "Transaction committed");
                     Ok(value)
                  }
                  Err(err) => {
                     if let Err(rollback_err) = sqlx::query(ROLLBACK_SQL).execute(&mut *conn).await {
                        warn!(queue = %id, error = %rollback_err, "Rollback after failed transaction also failed");
                     } else {
                        debug!(queue = %id, %kind, "Transaction rolled back");
                     }
                     Err(err)
                  }
               }
            })
         })
         .await
   }

   /// Run `f` inside a named savepoint within a single queued turn.
   ///
   /// The name is quoted before it reaches the SQL text, so any string is a
   /// valid savepoint name. On failure a nested savepoint is rolled back to
   /// and released, while an outermost one rolls back the whole transaction.
   /// The original error is returned either way.
   pub async fn execute_in_savepoint<F, T>(&self, name: &str, f: F) -> Result<T>
   where
      F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send + 'static,
      T: Send + 'static,
   {
      let id = self.id;
      let sql = SavepointSql::new(name);
      self
         .execute(move |conn| {
            Box::pin(async move {
               // An outermost savepoint opens the transaction itself, and
               // releasing it after ROLLBACK TO would commit
               let outermost = in_autocommit(&mut *conn).await?;
               sqlx::query(&sql.begin).execute(&mut *conn).await?;

               let outcome = match f(&mut *conn).await {
                  Ok(value) => sqlx::query(&sql.release)
                     .execute(&mut *conn)
                     .await
                     .map(|_| value)
                     .map_err(Error::from),
                  Err(err) => Err(err),
               };

               if outcome.is_err() {
                  let cleanup = if outermost {
                     vec![ROLLBACK_SQL]
                  } else {
                     vec![sql.rollback.as_str(), sql.release.as_str()]
                  };
                  for statement in cleanup {
                     if let Err(cleanup_err) = sqlx::query(statement).execute(&mut *conn).await {
                        warn!(queue = %id, error = %cleanup_err, "Savepoint cleanup failed");
                     }
                  }
               }
               outcome
            })
         })
         .await
   }

   /// Close the connection.
   ///
   /// If a queued closure still holds the connection (its caller gave up
   /// waiting), the handle is dropped instead and closes when that closure
   /// finishes.
   pub async fn close(self) -> Result<()> {
      match Arc::try_unwrap(self.conn) {
         Ok(mutex) => {
            mutex.into_inner().close().await?;
            debug!(queue = %self.id, "Closed connection");
         }
         Err(_) => {
            debug!(queue = %self.id, "Connection still in use, dropping handle");
         }
      }
      Ok(())
   }
}

impl PartialEq for ConnectionQueue {
   fn eq(&self, other: &Self) -> bool {
      self.id == other.id
   }
}

impl Eq for ConnectionQueue {}

impl Hash for ConnectionQueue {
   fn hash<H: Hasher>(&self, state: &mut H) {
      self.id.hash(state);
   }
}

impl fmt::Debug for ConnectionQueue {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("ConnectionQueue").field("id", &self.id).finish()
   }
}
