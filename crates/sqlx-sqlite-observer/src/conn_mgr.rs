//! Observation of databases managed by `sqlx-sqlite-conn-mgr`.
//!
//! Hooks are installed on the writer queue's connection, so every write made
//! through [`SqliteDatabase::write`] and its transaction helpers is tracked.
//! Changes are buffered during transactions and only published after commit.
//!
//! # Example
//!
//! ```no_run
//! use sqlx_sqlite_conn_mgr::SqliteDatabase;
//! use sqlx_sqlite_observer::{ObservableSqliteDatabase, ObserverConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!    let db = SqliteDatabase::connect("mydb.db", None).await?;
//!    let config = ObserverConfig::new().with_tables(["users", "posts"]);
//!    let observable = ObservableSqliteDatabase::new(db, config).await?;
//!
//!    let mut rx = observable.subscribe(["users"]);
//!
//!    observable
//!       .inner()
//!       .write(|conn| {
//!          Box::pin(async move {
//!             sqlx::query("INSERT INTO users (name) VALUES (?)")
//!                .bind("Alice")
//!                .execute(&mut *conn)
//!                .await?;
//!             Ok(())
//!          })
//!       })
//!       .await?;
//!
//!    let change = rx.recv().await?;
//!    println!("{} row {} changed", change.table, change.rowid);
//!
//!    observable.detach().await?;
//!    Ok(())
//! }
//! ```

use std::sync::Arc;

use sqlx_sqlite_conn_mgr::SqliteDatabase;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::Result;
use crate::broker::ObservationBroker;
use crate::change::TableChange;
use crate::config::ObserverConfig;
use crate::hooks;
use crate::stream::{TableChangeStream, TableChangeStreamExt};

/// Wrapper around `SqliteDatabase` that provides change observation.
///
/// Reads are unaffected. Hooks stay installed until [`detach`](Self::detach)
/// is called; dropping the wrapper schedules the detach on the current tokio
/// runtime instead.
pub struct ObservableSqliteDatabase {
   db: Arc<SqliteDatabase>,
   broker: Arc<ObservationBroker>,
   attached: bool,
}

impl ObservableSqliteDatabase {
   /// Install the observation hooks on the writer of `db`.
   ///
   /// # Arguments
   ///
   /// * `db` - The `SqliteDatabase` instance to observe
   /// * `config` - Observer configuration specifying which tables to track
   pub async fn new(db: Arc<SqliteDatabase>, config: ObserverConfig) -> Result<Self> {
      let broker = Arc::new(ObservationBroker::new(config.channel_capacity));
      broker.observe_tables(config.tables.iter().map(String::as_str));

      let hook_broker = Arc::clone(&broker);
      db.write(move |conn| {
         Box::pin(async move {
            let mut handle = conn.lock_handle().await?;
            let raw = handle.as_raw_handle().as_ptr();
            // SAFETY: the handle lock keeps the connection idle while the
            // hooks are swapped
            unsafe { hooks::register_hooks(raw, &hook_broker) };
            Ok(())
         })
      })
      .await?;

      debug!(location = %db.location(), "Attached change observer");
      Ok(Self {
         db,
         broker,
         attached: true,
      })
   }

   /// Subscribe to change notifications.
   ///
   /// `tables` are added to the observed set. The receiver gets every
   /// observed change once its transaction commits.
   pub fn subscribe<I, S>(&self, tables: I) -> broadcast::Receiver<TableChange>
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      let tables: Vec<String> = tables.into_iter().map(Into::into).collect();
      self
         .broker
         .observe_tables(tables.iter().map(String::as_str));
      self.broker.subscribe()
   }

   /// Subscribe and get a `Stream` for easier async iteration.
   ///
   /// With a non-empty `tables`, the stream only yields changes to those.
   pub fn subscribe_stream<I, S>(&self, tables: I) -> TableChangeStream
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      let tables: Vec<String> = tables.into_iter().map(Into::into).collect();
      self
         .broker
         .observe_tables(tables.iter().map(String::as_str));
      let stream = self.broker.subscribe().into_stream();
      if tables.is_empty() {
         stream
      } else {
         stream.filter_tables(tables)
      }
   }

   /// Get the underlying `SqliteDatabase`.
   pub fn inner(&self) -> &Arc<SqliteDatabase> {
      &self.db
   }

   /// Get the list of currently observed tables.
   pub fn observed_tables(&self) -> Vec<String> {
      self.broker.get_observed_tables()
   }

   /// Returns a reference to the underlying observation broker.
   pub fn broker(&self) -> &Arc<ObservationBroker> {
      &self.broker
   }

   /// Remove the hooks from the writer. Receivers see the channel close
   /// once this wrapper is gone.
   pub async fn detach(mut self) -> Result<()> {
      self.attached = false;
      unregister(&self.db).await
   }
}

async fn unregister(db: &SqliteDatabase) -> Result<()> {
   db.write(|conn| {
      Box::pin(async move {
         let mut handle = conn.lock_handle().await?;
         let raw = handle.as_raw_handle().as_ptr();
         // SAFETY: see ObservableSqliteDatabase::new
         unsafe { hooks::unregister_hooks(raw) };
         Ok(())
      })
   })
   .await?;
   debug!(location = %db.location(), "Detached change observer");
   Ok(())
}

impl Drop for ObservableSqliteDatabase {
   fn drop(&mut self) {
      if !self.attached {
         return;
      }

      let Ok(runtime) = Handle::try_current() else {
         warn!("Observer dropped outside a tokio runtime; inert hooks stay until the writer closes");
         return;
      };

      let db = Arc::clone(&self.db);
      runtime.spawn(async move {
         if let Err(err) = unregister(&db).await {
            debug!(error = %err, "Deferred observer detach failed");
         }
      });
   }
}
