//! # sqlx-sqlite-toolkit
//!
//! Typed values, decoded rows and a query-level API on top of
//! [`sqlx_sqlite_conn_mgr`].
//!
//! - **[`Value`]** / **[`FromValue`]**: one variant per SQLite storage class,
//!   with conversions from Rust and JSON values
//! - **[`Row`]**: column names plus values, addressable by position or name
//! - **[`DatabaseWrapper`]**: `execute`, `execute_transaction`,
//!   `execute_in_savepoint`, `fetch_all` and `fetch_one` over a
//!   [`SqliteDatabase`](sqlx_sqlite_conn_mgr::SqliteDatabase)
//!
//! Values are always bound as parameters, never spliced into SQL text.

mod decode;
mod error;
mod row;
mod value;
mod wrapper;

pub use decode::{decode_rows, decode_value};
pub use error::{Error, Result};
pub use row::{ColumnIndex, Row};
pub use value::{FromValue, Value, bind_value, bind_values};
pub use wrapper::{DatabaseWrapper, Statement, WriteQueryResult};

pub use sqlx_sqlite_conn_mgr;
#[cfg(feature = "observer")]
pub use sqlx_sqlite_observer;
