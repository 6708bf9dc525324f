//! Buffering and fan-out of change notifications

use std::collections::HashSet;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::change::{ChangeOperation, TableChange};

/// Collects changes reported by the hooks and publishes them on commit.
///
/// Hook callbacks run on the thread that steps the statement, so every
/// method here is synchronous and never blocks for long.
#[derive(Debug)]
pub struct ObservationBroker {
   observed: RwLock<HashSet<String>>,
   pending: Mutex<Vec<TableChange>>,
   sender: broadcast::Sender<TableChange>,
}

impl ObservationBroker {
   pub fn new(channel_capacity: usize) -> Self {
      let (sender, _) = broadcast::channel(channel_capacity.max(1));
      Self {
         observed: RwLock::new(HashSet::new()),
         pending: Mutex::new(Vec::new()),
         sender,
      }
   }

   pub fn observe_tables<'a>(&self, tables: impl IntoIterator<Item = &'a str>) {
      let mut observed = self.observed.write();
      for table in tables {
         if observed.insert(table.to_string()) {
            debug!(table, "Observing table");
         }
      }
   }

   pub fn is_observed(&self, table: &str) -> bool {
      self.observed.read().contains(table)
   }

   pub fn get_observed_tables(&self) -> Vec<String> {
      let mut tables: Vec<String> = self.observed.read().iter().cloned().collect();
      tables.sort();
      tables
   }

   pub fn subscribe(&self) -> broadcast::Receiver<TableChange> {
      self.sender.subscribe()
   }

   /// Number of changes waiting for the current transaction to commit.
   pub fn pending_len(&self) -> usize {
      self.pending.lock().len()
   }

   /// A row changed inside the current transaction.
   pub fn on_change(&self, operation: ChangeOperation, table: &str, rowid: i64) {
      if !self.is_observed(table) {
         return;
      }
      trace!(table, ?operation, rowid, "Buffered change");
      self.pending.lock().push(TableChange {
         table: table.to_string(),
         operation,
         rowid,
         timestamp: Instant::now(),
      });
   }

   /// The current transaction is committing; publish what it changed.
   pub fn on_commit(&self) {
      let changes = std::mem::take(&mut *self.pending.lock());
      if changes.is_empty() {
         return;
      }

      let count = changes.len();
      for change in changes {
         // Fails only when nobody is subscribed
         if self.sender.send(change).is_err() {
            break;
         }
      }
      debug!(count, "Published committed changes");
   }

   /// The current transaction rolled back; forget what it changed.
   pub fn on_rollback(&self) {
      let mut pending = self.pending.lock();
      if !pending.is_empty() {
         debug!(count = pending.len(), "Discarded rolled back changes");
         pending.clear();
      }
   }
}
