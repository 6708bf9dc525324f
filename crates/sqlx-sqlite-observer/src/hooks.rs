//! SQLite update, commit and rollback hooks.
//!
//! All three hooks share one `user_data` pointer: a weak reference to the
//! [`ObservationBroker`] turned into a raw pointer at registration and
//! reclaimed when the hooks are removed. Once the broker is gone the hooks
//! do nothing.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::{Arc, Weak};

use libsqlite3_sys::{sqlite3, sqlite3_commit_hook, sqlite3_rollback_hook, sqlite3_update_hook};
use tracing::{debug, trace};

use crate::broker::ObservationBroker;
use crate::change::ChangeOperation;

/// # Safety
///
/// `user_data` must be a pointer produced by [`register_hooks`] that
/// [`unregister_hooks`] has not reclaimed yet.
unsafe fn with_broker(user_data: *mut c_void, f: impl FnOnce(&ObservationBroker)) {
   // The hooks keep their reference until unregister_hooks, so it must not
   // be dropped here
   let weak = ManuallyDrop::new(unsafe { Weak::from_raw(user_data as *const ObservationBroker) });
   if let Some(broker) = weak.upgrade() {
      f(&broker);
   }
}

unsafe extern "C" fn update_trampoline(
   user_data: *mut c_void,
   op: c_int,
   _db_name: *const c_char,
   table: *const c_char,
   rowid: i64,
) {
   let Some(operation) = ChangeOperation::from_sqlite_code(op) else {
      return;
   };
   // SAFETY: SQLite passes a NUL-terminated table name valid for this call.
   let table = unsafe { CStr::from_ptr(table) }.to_string_lossy();
   // SAFETY: SQLite hands back the pointer given to sqlite3_update_hook
   unsafe { with_broker(user_data, |broker| broker.on_change(operation, &table, rowid)) };
}

unsafe extern "C" fn commit_trampoline(user_data: *mut c_void) -> c_int {
   // SAFETY: see update_trampoline
   unsafe { with_broker(user_data, ObservationBroker::on_commit) };
   // Zero lets the commit proceed
   0
}

unsafe extern "C" fn rollback_trampoline(user_data: *mut c_void) {
   // SAFETY: see update_trampoline
   unsafe { with_broker(user_data, ObservationBroker::on_rollback) };
}

/// Install the hooks on `db`, replacing any hooks this crate installed before.
///
/// # Safety
///
/// `db` must be a valid connection handle, and no statement may be running
/// on it while the hooks are swapped.
pub unsafe fn register_hooks(db: *mut sqlite3, broker: &Arc<ObservationBroker>) {
   // SAFETY: guaranteed by the caller
   unsafe { unregister_hooks(db) };

   let user_data = Weak::into_raw(Arc::downgrade(broker)) as *mut c_void;

   // SAFETY: db is valid and the trampolines match the C signatures
   unsafe {
      sqlite3_update_hook(db, Some(update_trampoline), user_data);
      sqlite3_commit_hook(db, Some(commit_trampoline), user_data);
      sqlite3_rollback_hook(db, Some(rollback_trampoline), user_data);
   }
   debug!("Registered SQLite observation hooks");
}

/// Remove the hooks and release the broker reference they held.
///
/// Returns `false` when no hooks were installed.
///
/// # Safety
///
/// Same requirements as [`register_hooks`]. Hooks installed on `db` by
/// anything other than this module must not be present.
pub unsafe fn unregister_hooks(db: *mut sqlite3) -> bool {
   // SAFETY: guaranteed by the caller
   let previous = unsafe {
      sqlite3_commit_hook(db, None, ptr::null_mut());
      sqlite3_rollback_hook(db, None, ptr::null_mut());
      sqlite3_update_hook(db, None, ptr::null_mut())
   };

   if previous.is_null() {
      return false;
   }

   // SAFETY: previous came from Weak::into_raw in register_hooks and no
   // callback can observe it any more.
   drop(unsafe { Weak::from_raw(previous as *const ObservationBroker) });
   trace!("Unregistered SQLite observation hooks");
   true
}
