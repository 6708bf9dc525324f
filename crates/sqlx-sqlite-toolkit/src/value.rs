//! Dynamically typed SQLite values

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value as JsonValue;
use sqlx::Sqlite;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;

use crate::{Error, Result};

/// A single SQLite value, one variant per storage class.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
   #[default]
   Null,
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
}

impl Value {
   /// Storage class name as SQLite reports it from `typeof()`.
   pub fn type_name(&self) -> &'static str {
      match self {
         Value::Null => "null",
         Value::Integer(_) => "integer",
         Value::Real(_) => "real",
         Value::Text(_) => "text",
         Value::Blob(_) => "blob",
      }
   }

   pub fn is_null(&self) -> bool {
      matches!(self, Value::Null)
   }

   /// Convert to JSON. Blobs become base64 strings and non-finite reals
   /// become `null`.
   pub fn to_json(&self) -> JsonValue {
      match self {
         Value::Null => JsonValue::Null,
         Value::Integer(i) => JsonValue::from(*i),
         Value::Real(r) => serde_json::Number::from_f64(*r)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
         Value::Text(s) => JsonValue::String(s.clone()),
         Value::Blob(bytes) => JsonValue::String(STANDARD.encode(bytes)),
      }
   }
}

macro_rules! impl_from_integer {
   ($($ty:ty),*) => {
      $(
         impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
               Value::Integer(i64::from(value))
            }
         }
      )*
   };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32, bool);

impl From<f64> for Value {
   fn from(value: f64) -> Self {
      Value::Real(value)
   }
}

impl From<f32> for Value {
   fn from(value: f32) -> Self {
      Value::Real(f64::from(value))
   }
}

impl From<String> for Value {
   fn from(value: String) -> Self {
      Value::Text(value)
   }
}

impl From<&str> for Value {
   fn from(value: &str) -> Self {
      Value::Text(value.to_owned())
   }
}

impl From<Vec<u8>> for Value {
   fn from(value: Vec<u8>) -> Self {
      Value::Blob(value)
   }
}

impl From<&[u8]> for Value {
   fn from(value: &[u8]) -> Self {
      Value::Blob(value.to_vec())
   }
}

impl<T: Into<Value>> From<Option<T>> for Value {
   fn from(value: Option<T>) -> Self {
      value.map_or(Value::Null, Into::into)
   }
}

/// JSON parameters are mapped onto the closest storage class: booleans
/// become 0/1, numbers outside the `i64` range become reals, and arrays or
/// objects are stored as their JSON text.
impl From<JsonValue> for Value {
   fn from(value: JsonValue) -> Self {
      match value {
         JsonValue::Null => Value::Null,
         JsonValue::Bool(b) => Value::from(b),
         JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
               Value::Integer(i)
            } else {
               // u64 above i64::MAX and all fractional numbers
               Value::Real(n.as_f64().unwrap_or_default())
            }
         }
         JsonValue::String(s) => Value::Text(s),
         other => Value::Text(other.to_string()),
      }
   }
}

impl From<Value> for JsonValue {
   fn from(value: Value) -> Self {
      match value {
         Value::Text(s) => JsonValue::String(s),
         other => other.to_json(),
      }
   }
}

/// Extract a Rust value from a [`Value`].
///
/// Integer and real values convert into each other the way SQLite does it
/// (reals truncate toward zero). Any other mismatch is
/// [`Error::TypeMismatch`].
pub trait FromValue: Sized {
   fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, found: &Value) -> Error {
   Error::TypeMismatch {
      expected,
      found: found.type_name(),
   }
}

impl FromValue for Value {
   fn from_value(value: &Value) -> Result<Self> {
      Ok(value.clone())
   }
}

impl FromValue for i64 {
   fn from_value(value: &Value) -> Result<Self> {
      match value {
         Value::Integer(i) => Ok(*i),
         Value::Real(r) => Ok(*r as i64),
         other => Err(mismatch("integer", other)),
      }
   }
}

macro_rules! impl_from_value_narrow {
   ($($ty:ty),*) => {
      $(
         impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self> {
               let wide = i64::from_value(value)?;
               <$ty>::try_from(wide).map_err(|_| mismatch(stringify!($ty), value))
            }
         }
      )*
   };
}

impl_from_value_narrow!(i8, i16, i32, u8, u16, u32, u64);

impl FromValue for bool {
   fn from_value(value: &Value) -> Result<Self> {
      i64::from_value(value).map(|i| i != 0)
   }
}

impl FromValue for f64 {
   fn from_value(value: &Value) -> Result<Self> {
      match value {
         Value::Real(r) => Ok(*r),
         Value::Integer(i) => Ok(*i as f64),
         other => Err(mismatch("real", other)),
      }
   }
}

impl FromValue for String {
   fn from_value(value: &Value) -> Result<Self> {
      match value {
         Value::Text(s) => Ok(s.clone()),
         other => Err(mismatch("text", other)),
      }
   }
}

impl FromValue for Vec<u8> {
   fn from_value(value: &Value) -> Result<Self> {
      match value {
         Value::Blob(bytes) => Ok(bytes.clone()),
         Value::Text(s) => Ok(s.as_bytes().to_vec()),
         other => Err(mismatch("blob", other)),
      }
   }
}

impl<T: FromValue> FromValue for Option<T> {
   fn from_value(value: &Value) -> Result<Self> {
      match value {
         Value::Null => Ok(None),
         other => T::from_value(other).map(Some),
      }
   }
}

impl FromValue for JsonValue {
   fn from_value(value: &Value) -> Result<Self> {
      Ok(value.to_json())
   }
}

/// Bind a [`Value`] as the next positional parameter of `query`.
pub fn bind_value<'q>(
   query: Query<'q, Sqlite, SqliteArguments<'q>>,
   value: Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
   match value {
      Value::Null => query.bind(None::<i64>),
      Value::Integer(i) => query.bind(i),
      Value::Real(r) => query.bind(r),
      Value::Text(s) => query.bind(s),
      Value::Blob(bytes) => query.bind(bytes),
   }
}

/// Bind every value in order.
pub fn bind_values<'q>(
   mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
   values: Vec<Value>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
   for value in values {
      query = bind_value(query, value);
   }
   query
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   #[test]
   fn test_from_json_numbers() {
      assert_eq!(Value::from(json!(42)), Value::Integer(42));
      assert_eq!(Value::from(json!(-7)), Value::Integer(-7));
      assert_eq!(Value::from(json!(1.5)), Value::Real(1.5));
      assert_eq!(Value::from(json!(u64::MAX)), Value::Real(u64::MAX as f64));
   }

   #[test]
   fn test_from_json_other_kinds() {
      assert_eq!(Value::from(json!(null)), Value::Null);
      assert_eq!(Value::from(json!(true)), Value::Integer(1));
      assert_eq!(Value::from(json!("hi")), Value::Text("hi".into()));
      assert_eq!(Value::from(json!([1, 2])), Value::Text("[1,2]".into()));
      assert_eq!(
         Value::from(json!({"a": 1})),
         Value::Text(r#"{"a":1}"#.into())
      );
   }

   #[test]
   fn test_to_json() {
      assert_eq!(Value::Integer(3).to_json(), json!(3));
      assert_eq!(Value::Real(f64::NAN).to_json(), JsonValue::Null);
      assert_eq!(Value::Blob(b"Hello".to_vec()).to_json(), json!("SGVsbG8="));
      assert_eq!(JsonValue::from(Value::Text("x".into())), json!("x"));
   }

   #[test]
   fn test_option_into_value() {
      assert_eq!(Value::from(None::<i32>), Value::Null);
      assert_eq!(Value::from(Some("a")), Value::Text("a".into()));
   }

   #[test]
   fn test_numeric_coercion() {
      assert_eq!(i64::from_value(&Value::Real(2.9)).unwrap(), 2);
      assert_eq!(i64::from_value(&Value::Real(-2.9)).unwrap(), -2);
      assert_eq!(f64::from_value(&Value::Integer(4)).unwrap(), 4.0);
      assert!(bool::from_value(&Value::Integer(2)).unwrap());
   }

   #[test]
   fn test_narrowing_out_of_range_is_mismatch() {
      let err = u8::from_value(&Value::Integer(300)).unwrap_err();
      assert!(matches!(err, Error::TypeMismatch { expected: "u8", .. }));
      assert!(u64::from_value(&Value::Integer(-1)).is_err());
   }

   #[test]
   fn test_mismatch_reports_found_type() {
      let err = String::from_value(&Value::Integer(1)).unwrap_err();
      assert!(matches!(
         err,
         Error::TypeMismatch {
            expected: "text",
            found: "integer"
         }
      ));
   }

   #[test]
   fn test_option_from_value() {
      assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
      assert_eq!(
         Option::<String>::from_value(&Value::Text("a".into())).unwrap(),
         Some("a".into())
      );
   }
}
