//! Decoding SQLite rows into [`Value`]s by runtime storage class

use std::sync::Arc;

use sqlx::sqlite::{SqliteRow, SqliteValueRef};
use sqlx::{Column, Decode, Row as _, Sqlite, TypeInfo, ValueRef};

use crate::row::Row;
use crate::value::Value;
use crate::{Error, Result};

enum StorageClass {
   Integer,
   Real,
   Text,
   Blob,
}

fn storage_class(value: &SqliteValueRef<'_>) -> Result<StorageClass> {
   let type_info = value.type_info();
   match type_info.name() {
      "INTEGER" | "BOOLEAN" => Ok(StorageClass::Integer),
      "REAL" => Ok(StorageClass::Real),
      "TEXT" => Ok(StorageClass::Text),
      "BLOB" => Ok(StorageClass::Blob),
      other => Err(Error::UnsupportedDatatype(other.to_string())),
   }
}

fn decode_as<'r, T: Decode<'r, Sqlite>>(value: SqliteValueRef<'r>) -> Result<T> {
   T::decode(value).map_err(|e| Error::Sqlx(sqlx::Error::Decode(e)))
}

/// Decode one column value, choosing the variant from the value's own
/// storage class rather than the column's declared type.
pub fn decode_value(value: SqliteValueRef<'_>) -> Result<Value> {
   if value.is_null() {
      return Ok(Value::Null);
   }

   Ok(match storage_class(&value)? {
      StorageClass::Integer => Value::Integer(decode_as(value)?),
      StorageClass::Real => Value::Real(decode_as(value)?),
      StorageClass::Text => Value::Text(decode_as(value)?),
      StorageClass::Blob => Value::Blob(decode_as(value)?),
   })
}

/// Decode engine rows. Column names are shared between all rows of a result.
pub fn decode_rows(rows: Vec<SqliteRow>) -> Result<Vec<Row>> {
   let Some(first) = rows.first() else {
      return Ok(Vec::new());
   };

   let columns: Arc<[String]> = first
      .columns()
      .iter()
      .map(|column| column.name().to_string())
      .collect();

   rows
      .iter()
      .map(|row| {
         let values = (0..columns.len())
            .map(|i| decode_value(row.try_get_raw(i)?))
            .collect::<Result<Vec<_>>>()?;
         Ok(Row::new(Arc::clone(&columns), values))
      })
      .collect()
}
