use std::time::Instant;

use libsqlite3_sys::{SQLITE_DELETE, SQLITE_INSERT, SQLITE_UPDATE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOperation {
   Insert,
   Update,
   Delete,
}

impl ChangeOperation {
   /// Map the operation code passed to SQLite's update hook.
   pub fn from_sqlite_code(code: i32) -> Option<Self> {
      match code {
         SQLITE_INSERT => Some(ChangeOperation::Insert),
         SQLITE_UPDATE => Some(ChangeOperation::Update),
         SQLITE_DELETE => Some(ChangeOperation::Delete),
         _ => None,
      }
   }
}

/// Notification of a change to a database table.
///
/// Changes are only sent after the transaction commits successfully.
#[derive(Debug, Clone)]
pub struct TableChange {
   pub table: String,
   pub operation: ChangeOperation,
   /// The SQLite rowid of the affected row.
   pub rowid: i64,
   /// When the change was made, not when it was committed.
   pub timestamp: Instant,
}

/// Item yielded by [`TableChangeStream`](crate::TableChangeStream).
#[derive(Debug, Clone)]
pub enum TableChangeEvent {
   Change(TableChange),
   /// The subscriber fell behind and this many changes were dropped.
   Lagged(u64),
}
