//! Decoded result rows

use std::ops::Index;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;

use crate::value::{FromValue, Value};
use crate::{Error, Result};

/// One result row: column names in query order plus one value per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
   columns: Arc<[String]>,
   values: Vec<Value>,
}

impl Row {
   pub(crate) fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
      debug_assert_eq!(columns.len(), values.len());
      Self { columns, values }
   }

   pub fn columns(&self) -> &[String] {
      &self.columns
   }

   pub fn values(&self) -> &[Value] {
      &self.values
   }

   pub fn into_values(self) -> Vec<Value> {
      self.values
   }

   pub fn len(&self) -> usize {
      self.values.len()
   }

   pub fn is_empty(&self) -> bool {
      self.values.is_empty()
   }

   /// Value at a column position
   pub fn get(&self, index: usize) -> Option<&Value> {
      self.values.get(index)
   }

   /// Value of the first column with this name
   pub fn get_named(&self, name: &str) -> Option<&Value> {
      self.position(name).map(|i| &self.values[i])
   }

   /// Convert the value at `index` (a position or a column name).
   pub fn try_get<T: FromValue, I: ColumnIndex>(&self, index: I) -> Result<T> {
      let position = index.position(self)?;
      T::from_value(&self.values[position])
   }

   /// Column name to JSON value, in query order.
   pub fn to_json(&self) -> IndexMap<String, JsonValue> {
      self
         .columns
         .iter()
         .cloned()
         .zip(self.values.iter().map(Value::to_json))
         .collect()
   }

   fn position(&self, name: &str) -> Option<usize> {
      self.columns.iter().position(|column| column == name)
   }
}

impl Index<usize> for Row {
   type Output = Value;

   fn index(&self, index: usize) -> &Value {
      &self.values[index]
   }
}

impl Index<&str> for Row {
   type Output = Value;

   fn index(&self, name: &str) -> &Value {
      match self.get_named(name) {
         Some(value) => value,
         None => panic!("no column named {name:?}"),
      }
   }
}

impl Serialize for Row {
   fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
      let mut map = serializer.serialize_map(Some(self.len()))?;
      for (column, value) in self.columns.iter().zip(&self.values) {
         map.serialize_entry(column, &value.to_json())?;
      }
      map.end()
   }
}

/// Something that selects a column of a [`Row`].
pub trait ColumnIndex {
   fn position(&self, row: &Row) -> Result<usize>;
}

impl ColumnIndex for usize {
   fn position(&self, row: &Row) -> Result<usize> {
      if *self < row.len() {
         Ok(*self)
      } else {
         Err(Error::ColumnIndexOutOfRange {
            index: *self,
            len: row.len(),
         })
      }
   }
}

impl ColumnIndex for &str {
   fn position(&self, row: &Row) -> Result<usize> {
      row
         .position(self)
         .ok_or_else(|| Error::ColumnNotFound(self.to_string()))
   }
}
