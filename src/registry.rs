//! Open databases keyed by storage location

use std::collections::HashMap;

use sqlx_sqlite_conn_mgr::{SqliteDatabaseConfig, StorageLocation};
use sqlx_sqlite_toolkit::DatabaseWrapper;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Database instances owned by one application component.
///
/// Loading the same location twice returns the already open database, so
/// every caller shares one writer queue and one read pool per database.
#[derive(Debug, Default)]
pub struct DatabaseRegistry {
   databases: RwLock<HashMap<StorageLocation, DatabaseWrapper>>,
   default_config: SqliteDatabaseConfig,
}

impl DatabaseRegistry {
   /// Registry that opens databases with [`SqliteDatabaseConfig::default`]
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_config(default_config: SqliteDatabaseConfig) -> Self {
      Self {
         databases: RwLock::default(),
         default_config,
      }
   }

   /// Configuration used by [`load`](Self::load) when none is given
   pub fn default_config(&self) -> &SqliteDatabaseConfig {
      &self.default_config
   }

   /// Open the database at `location`, or return it if it is already open.
   ///
   /// `config` only applies when the database is opened by this call.
   pub async fn load(
      &self,
      location: impl Into<StorageLocation>,
      config: Option<SqliteDatabaseConfig>,
   ) -> Result<DatabaseWrapper> {
      let location = location.into();

      if let Some(db) = self.databases.read().await.get(&location) {
         return Ok(db.clone());
      }

      // Hold the write lock across connect so concurrent loads of one
      // location open it once
      let mut databases = self.databases.write().await;
      if let Some(db) = databases.get(&location) {
         return Ok(db.clone());
      }

      let config = config.unwrap_or_else(|| self.default_config.clone());
      let db = DatabaseWrapper::connect(location.clone(), Some(config)).await?;
      debug!(location = %location, "Loaded database");
      databases.insert(location, db.clone());
      Ok(db)
   }

   /// The open database at `location`
   pub async fn get(&self, location: impl Into<StorageLocation>) -> Result<DatabaseWrapper> {
      let location = location.into();
      self
         .databases
         .read()
         .await
         .get(&location)
         .cloned()
         .ok_or_else(|| Error::DatabaseNotLoaded(location.to_string()))
   }

   /// Locations of every open database
   pub async fn loaded(&self) -> Vec<StorageLocation> {
      self.databases.read().await.keys().cloned().collect()
   }

   /// Close and forget the database at `location`.
   ///
   /// Returns `false` when nothing was loaded there.
   pub async fn close(&self, location: impl Into<StorageLocation>) -> Result<bool> {
      let location = location.into();
      let Some(db) = self.databases.write().await.remove(&location) else {
         return Ok(false);
      };
      db.close().await?;
      debug!(location = %location, "Closed database");
      Ok(true)
   }

   /// Close every open database.
   ///
   /// All databases are closed even if some fail; the first failure is
   /// returned.
   pub async fn close_all(&self) -> Result<()> {
      let databases: Vec<_> = self.databases.write().await.drain().collect();

      let mut first_error = None;
      for (location, db) in databases {
         if let Err(err) = db.close().await {
            warn!(location = %location, error = %err, "Failed to close database");
            first_error.get_or_insert(err);
         }
      }

      match first_error {
         Some(err) => Err(err.into()),
         None => Ok(()),
      }
   }

   /// Close the database at `location` and delete its files.
   pub async fn remove(&self, location: impl Into<StorageLocation>) -> Result<()> {
      let location = location.into();
      let db = self
         .databases
         .write()
         .await
         .remove(&location)
         .ok_or_else(|| Error::DatabaseNotLoaded(location.to_string()))?;
      db.remove().await?;
      debug!(location = %location, "Removed database");
      Ok(())
   }
}
