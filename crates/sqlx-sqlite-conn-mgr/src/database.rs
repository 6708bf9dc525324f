//! SQLite database with a serialized writer and a pool of readers

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use sqlx::sqlite::SqliteConnection;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{JournalMode, SqliteDatabaseConfig, StorageLocation};
use crate::pool::{ConnectionPool, PoolStatus};
use crate::queue::ConnectionQueue;
use crate::transaction::{TransactionKind, quote_literal};
use crate::{Error, Result};

/// SQLite database with one writer and a pool of concurrent readers.
///
/// ## Architecture
///
/// - **`writer`**: a single read-write [`ConnectionQueue`]; every write is
///   serialized through it
/// - **`readers`**: a [`ConnectionPool`] of read-only connections that grows
///   with concurrent demand and drains back to one when idle
///
/// File-backed databases are switched to WAL journal mode when the writer is
/// opened, so readers never block the writer and vice versa.
///
/// ## Usage Pattern
///
/// ```text
/// 1. Connect (opens the writer, readers are opened on demand)
/// 2. Reads: `read` runs on any free reader
/// 3. Writes: `write`, `write_in_transaction`, `write_in_savepoint`
/// 4. Close when done
/// ```
#[derive(Debug)]
pub struct SqliteDatabase {
   /// Serialized read-write connection, taken out on close
   writer: Mutex<Option<Arc<ConnectionQueue>>>,

   /// Read-only connections for concurrent reads
   readers: ConnectionPool,

   /// Marks database as closed to prevent further operations
   closed: AtomicBool,

   location: StorageLocation,
}

impl SqliteDatabase {
   /// Open the writer for `location` and prepare a read pool for it.
   ///
   /// Fails with [`Error::UnsharedStorage`] for [`StorageLocation::Temporary`],
   /// whose data would be invisible to the readers.
   pub async fn connect(
      location: impl Into<StorageLocation>,
      config: Option<SqliteDatabaseConfig>,
   ) -> Result<Arc<Self>> {
      let location = location.into();
      let config = config.unwrap_or_default();

      if !location.is_shareable() {
         return Err(Error::UnsharedStorage(location.to_string()));
      }

      let mut writer_options = config.connection_options(location.clone());
      if location.path().is_some() {
         writer_options.journal_mode = Some(JournalMode::Wal);
      }

      let writer = ConnectionQueue::open(&writer_options, config.prepare.as_ref()).await?;
      let readers = ConnectionPool::new(
         config.connection_options(location.clone()),
         config.prepare.clone(),
         config.drain_delay,
      );

      debug!(location = %location, "Connected database");
      Ok(Arc::new(Self {
         writer: Mutex::new(Some(Arc::new(writer))),
         readers,
         closed: AtomicBool::new(false),
         location,
      }))
   }

   /// Where this database lives
   pub fn location(&self) -> &StorageLocation {
      &self.location
   }

   /// Path of the database file, for file-backed databases
   pub fn path(&self) -> Option<&Path> {
      self.location.path()
   }

   /// The read pool
   pub fn readers(&self) -> Result<&ConnectionPool> {
      self.ensure_open()?;
      Ok(&self.readers)
   }

   /// Sizes of the read pool
   pub fn reader_status(&self) -> PoolStatus {
      self.readers.status()
   }

   /// The writer queue
   pub async fn writer(&self) -> Result<Arc<ConnectionQueue>> {
      self.ensure_open()?;
      self
         .writer
         .lock()
         .await
         .as_ref()
         .map(Arc::clone)
         .ok_or(Error::DatabaseClosed)
   }

   /// Run `f` on a free read-only connection
   pub async fn read<F, T>(&self, f: F) -> Result<T>
   where
      F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send + 'static,
      T: Send + 'static,
   {
      self.readers()?.execute(f).await
   }

   /// Run `f` on the writer
   pub async fn write<F, T>(&self, f: F) -> Result<T>
   where
      F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send + 'static,
      T: Send + 'static,
   {
      self.writer().await?.execute(f).await
   }

   /// Run `f` on the writer inside a transaction
   pub async fn write_in_transaction<F, T>(&self, kind: TransactionKind, f: F) -> Result<T>
   where
      F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send + 'static,
      T: Send + 'static,
   {
      self.writer().await?.execute_in_transaction(kind, f).await
   }

   /// Run `f` on the writer inside a named savepoint
   pub async fn write_in_savepoint<F, T>(&self, name: &str, f: F) -> Result<T>
   where
      F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send + 'static,
      T: Send + 'static,
   {
      self.writer().await?.execute_in_savepoint(name, f).await
   }

   /// Copy WAL content back into the main database file and truncate the WAL.
   ///
   /// Returns `(busy, log_frames, checkpointed_frames)` as reported by SQLite.
   pub async fn checkpoint(&self) -> Result<(i64, i64, i64)> {
      self
         .write(|conn| {
            Box::pin(async move {
               let row: (i64, i64, i64) = sqlx::query_as("PRAGMA wal_checkpoint(TRUNCATE)")
                  .fetch_one(&mut *conn)
                  .await?;
               Ok(row)
            })
         })
         .await
   }

   /// Write a consistent copy of the database to `destination`.
   ///
   /// The destination must not already exist.
   pub async fn backup_to(&self, destination: impl AsRef<Path>) -> Result<()> {
      let sql = format!(
         "VACUUM INTO {}",
         quote_literal(&destination.as_ref().to_string_lossy())
      );
      self
         .write(move |conn| {
            Box::pin(async move {
               sqlx::query(&sql).execute(&mut *conn).await?;
               Ok(())
            })
         })
         .await?;
      debug!(location = %self.location, destination = %destination.as_ref().display(), "Backed up database");
      Ok(())
   }

   /// Close the writer and every reader. Later calls fail with
   /// [`Error::DatabaseClosed`]; closing twice is a no-op.
   pub async fn close(&self) -> Result<()> {
      if self.closed.swap(true, Ordering::SeqCst) {
         return Ok(());
      }

      // Both halves are closed even when one fails; the first error wins
      let readers = self.readers.close().await;
      if let Err(err) = &readers {
         warn!(location = %self.location, error = %err, "Failed to close read pool");
      }

      let writer = self.writer.lock().await.take();
      let writer = match writer.map(Arc::try_unwrap) {
         Some(Ok(writer)) => writer.close().await,
         _ => Ok(()),
      };

      debug!(location = %self.location, "Closed database");
      readers.and(writer)
   }

   /// Close the database and delete its files, including the WAL and
   /// shared-memory companions.
   pub async fn remove(&self) -> Result<()> {
      self.close().await?;

      let Some(path) = self.location.path() else {
         return Ok(());
      };

      for file in database_files(path) {
         match std::fs::remove_file(&file) {
            Ok(()) => debug!(file = %file.display(), "Removed database file"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
         }
      }
      Ok(())
   }

   fn ensure_open(&self) -> Result<()> {
      if self.closed.load(Ordering::SeqCst) {
         return Err(Error::DatabaseClosed);
      }
      Ok(())
   }
}

fn database_files(path: &Path) -> [PathBuf; 3] {
   let with_suffix = |suffix: &str| {
      let mut name = path.as_os_str().to_owned();
      name.push(suffix);
      PathBuf::from(name)
   };
   [path.to_path_buf(), with_suffix("-wal"), with_suffix("-shm")]
}

#[cfg(test)]
mod tests {
   use super::*;
   use std::time::Duration;
   use tempfile::TempDir;

   async fn create_test_db() -> (Arc<SqliteDatabase>, TempDir) {
      let temp_dir = TempDir::new().expect("Failed to create temp directory");
      let config = SqliteDatabaseConfig {
         drain_delay: Duration::from_millis(50),
         ..Default::default()
      };
      let db = SqliteDatabase::connect(temp_dir.path().join("test.db"), Some(config))
         .await
         .expect("Failed to connect to test database");

      db.write(|conn| {
         Box::pin(async move {
            sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, val INTEGER NOT NULL)")
               .execute(&mut *conn)
               .await?;
            Ok(())
         })
      })
      .await
      .unwrap();

      (db, temp_dir)
   }

   async fn count(db: &SqliteDatabase) -> i64 {
      db.read(|conn| {
         Box::pin(async move {
            let n = sqlx::query_scalar("SELECT count(*) FROM t")
               .fetch_one(&mut *conn)
               .await?;
            Ok(n)
         })
      })
      .await
      .unwrap()
   }

   #[tokio::test]
   async fn test_readers_see_committed_writes() {
      let (db, _temp) = create_test_db().await;

      db.write(|conn| {
         Box::pin(async move {
            sqlx::query("INSERT INTO t (val) VALUES (1), (2)")
               .execute(&mut *conn)
               .await?;
            Ok(())
         })
      })
      .await
      .unwrap();

      assert_eq!(count(&db).await, 2);
   }

   #[tokio::test]
   async fn test_uses_wal_journal() {
      let (db, _temp) = create_test_db().await;

      let mode: String = db
         .write(|conn| {
            Box::pin(async move {
               let mode = sqlx::query_scalar("PRAGMA journal_mode")
                  .fetch_one(&mut *conn)
                  .await?;
               Ok(mode)
            })
         })
         .await
         .unwrap();

      assert_eq!(mode.to_lowercase(), "wal");
   }

   #[tokio::test]
   async fn test_failed_transaction_is_not_visible() {
      let (db, _temp) = create_test_db().await;

      let result = db
         .write_in_transaction(TransactionKind::Immediate, |conn| {
            Box::pin(async move {
               sqlx::query("INSERT INTO t (val) VALUES (10)")
                  .execute(&mut *conn)
                  .await?;
               sqlx::query("INSERT INTO t (val) VALUES (NULL)")
                  .execute(&mut *conn)
                  .await?;
               Ok(())
            })
         })
         .await;

      assert!(result.unwrap_err().is_statement_failure());
      assert_eq!(count(&db).await, 0);
   }

   #[tokio::test]
   async fn test_savepoint_on_writer() {
      let (db, _temp) = create_test_db().await;

      db.write_in_savepoint("bulk load", |conn| {
         Box::pin(async move {
            sqlx::query("INSERT INTO t (val) VALUES (1)")
               .execute(&mut *conn)
               .await?;
            Ok(())
         })
      })
      .await
      .unwrap();

      assert_eq!(count(&db).await, 1);
   }

   #[tokio::test]
   async fn test_temporary_storage_rejected() {
      let err = SqliteDatabase::connect(StorageLocation::Temporary, None)
         .await
         .unwrap_err();
      assert!(matches!(err, Error::UnsharedStorage(_)));
   }

   #[tokio::test]
   async fn test_in_memory_shared_between_writer_and_readers() {
      let db = SqliteDatabase::connect(StorageLocation::in_memory(), None)
         .await
         .unwrap();

      db.write(|conn| {
         Box::pin(async move {
            sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, val INTEGER NOT NULL)")
               .execute(&mut *conn)
               .await?;
            sqlx::query("INSERT INTO t (val) VALUES (7)")
               .execute(&mut *conn)
               .await?;
            Ok(())
         })
      })
      .await
      .unwrap();

      assert_eq!(count(&db).await, 1);
      db.close().await.unwrap();
   }

   #[tokio::test]
   async fn test_checkpoint_and_backup() {
      let (db, temp) = create_test_db().await;
      db.write(|conn| {
         Box::pin(async move {
            sqlx::query("INSERT INTO t (val) VALUES (5)")
               .execute(&mut *conn)
               .await?;
            Ok(())
         })
      })
      .await
      .unwrap();

      let (busy, _, _) = db.checkpoint().await.unwrap();
      assert_eq!(busy, 0);

      let backup_path = temp.path().join("it's a backup.db");
      db.backup_to(&backup_path).await.unwrap();

      let copy = SqliteDatabase::connect(&*backup_path, None).await.unwrap();
      assert_eq!(count(&copy).await, 1);
      copy.close().await.unwrap();
   }

   #[tokio::test]
   async fn test_close_takes_writer_after_readers_closed() {
      let (db, _temp) = create_test_db().await;
      assert_eq!(count(&db).await, 0);

      db.readers().unwrap().close().await.unwrap();
      db.close().await.unwrap();

      assert!(db.writer.lock().await.is_none());
      assert!(db.readers.is_closed());
      assert_eq!(db.reader_status().available, 0);
   }

   #[tokio::test]
   async fn test_close_and_remove() {
      let (db, temp) = create_test_db().await;
      let path = temp.path().join("test.db");
      assert_eq!(count(&db).await, 0);

      db.remove().await.unwrap();

      assert!(!path.exists());
      assert!(!temp.path().join("test.db-wal").exists());
      assert!(matches!(
         db.read(|_conn| Box::pin(async { Ok(()) })).await.unwrap_err(),
         Error::DatabaseClosed
      ));
      assert!(matches!(db.writer().await.unwrap_err(), Error::DatabaseClosed));

      // Closing again is a no-op
      db.close().await.unwrap();
   }
}
