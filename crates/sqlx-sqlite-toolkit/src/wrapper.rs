//! Statement-level read and write API over a managed database

use std::sync::Arc;

use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteQueryResult, SqliteRow};
use sqlx_sqlite_conn_mgr::{SqliteDatabase, SqliteDatabaseConfig, StorageLocation, TransactionKind};
use tracing::debug;

use crate::decode::decode_rows;
use crate::row::Row;
use crate::value::{Value, bind_values};
use crate::{Error, Result};

/// Result returned from write operations (e.g. INSERT, UPDATE, DELETE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteQueryResult {
   /// The number of rows affected by the write operation.
   pub rows_affected: u64,
   /// The last inserted row ID (SQLite ROWID).
   ///
   /// Only set for INSERT operations on tables with a ROWID.
   /// Tables created with `WITHOUT ROWID` will not set this value (returns 0).
   pub last_insert_id: i64,
}

impl From<SqliteQueryResult> for WriteQueryResult {
   fn from(result: SqliteQueryResult) -> Self {
      Self {
         rows_affected: result.rows_affected(),
         last_insert_id: result.last_insert_rowid(),
      }
   }
}

/// One statement of a batch: SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
   pub query: String,
   pub values: Vec<Value>,
}

impl Statement {
   pub fn new(query: impl Into<String>, values: Vec<Value>) -> Self {
      Self {
         query: query.into(),
         values,
      }
   }
}

impl<Q: Into<String>> From<(Q, Vec<Value>)> for Statement {
   fn from((query, values): (Q, Vec<Value>)) -> Self {
      Self::new(query, values)
   }
}

/// High-level query API over [`SqliteDatabase`].
///
/// Writes go through the serialized writer, reads through the read pool.
/// Cloning is cheap and every clone talks to the same database.
#[derive(Debug, Clone)]
pub struct DatabaseWrapper {
   inner: Arc<SqliteDatabase>,
}

impl DatabaseWrapper {
   /// Connect to a SQLite database via the connection manager
   pub async fn connect(
      location: impl Into<StorageLocation>,
      custom_config: Option<SqliteDatabaseConfig>,
   ) -> Result<Self> {
      let db = SqliteDatabase::connect(location, custom_config).await?;
      Ok(Self { inner: db })
   }

   /// Wrap an already connected database
   pub fn from_database(db: Arc<SqliteDatabase>) -> Self {
      Self { inner: db }
   }

   /// The underlying connection manager handle, for closure-level access
   pub fn inner(&self) -> &Arc<SqliteDatabase> {
      &self.inner
   }

   /// Execute a write query (INSERT/UPDATE/DELETE)
   pub async fn execute(
      &self,
      query: impl Into<String>,
      values: Vec<Value>,
   ) -> Result<WriteQueryResult> {
      let query = query.into();
      let result = self
         .inner
         .write(move |conn| {
            Box::pin(async move {
               let result = bind_values(sqlx::query(&query), values)
                  .execute(&mut *conn)
                  .await?;
               Ok(result)
            })
         })
         .await?;
      Ok(result.into())
   }

   /// Execute multiple write statements atomically within a transaction.
   ///
   /// The batch runs inside `BEGIN IMMEDIATE` on the writer. The first
   /// failing statement rolls everything back and its error is returned.
   /// Returns the result of each statement execution.
   pub async fn execute_transaction(
      &self,
      statements: Vec<Statement>,
   ) -> Result<Vec<WriteQueryResult>> {
      let count = statements.len();
      let results = self
         .inner
         .write_in_transaction(TransactionKind::Immediate, move |conn| {
            Box::pin(async move {
               let mut results = Vec::with_capacity(statements.len());
               for Statement { query, values } in statements {
                  let result = bind_values(sqlx::query(&query), values)
                     .execute(&mut *conn)
                     .await?;
                  results.push(WriteQueryResult::from(result));
               }
               Ok(results)
            })
         })
         .await?;
      debug!(statements = count, "Committed transaction batch");
      Ok(results)
   }

   /// Execute statements inside a named savepoint on the writer.
   ///
   /// Nests inside a transaction already open on the writer, otherwise it
   /// behaves like its own transaction.
   pub async fn execute_in_savepoint(
      &self,
      name: &str,
      statements: Vec<Statement>,
   ) -> Result<Vec<WriteQueryResult>> {
      let results = self
         .inner
         .write_in_savepoint(name, move |conn| {
            Box::pin(async move {
               let mut results = Vec::with_capacity(statements.len());
               for Statement { query, values } in statements {
                  let result = bind_values(sqlx::query(&query), values)
                     .execute(&mut *conn)
                     .await?;
                  results.push(WriteQueryResult::from(result));
               }
               Ok(results)
            })
         })
         .await?;
      Ok(results)
   }

   /// Execute a SELECT query, possibly returning multiple rows
   pub async fn fetch_all(
      &self,
      query: impl Into<String>,
      values: Vec<Value>,
   ) -> Result<Vec<Row>> {
      let query = query.into();
      let rows: Vec<SqliteRow> = self
         .inner
         .read(move |conn| {
            Box::pin(async move {
               let rows = bind_values(sqlx::query(&query), values)
                  .fetch_all(&mut *conn)
                  .await?;
               Ok(rows)
            })
         })
         .await?;

      decode_rows(rows)
   }

   /// Execute a SELECT query expecting zero or one result.
   ///
   /// At most two rows are stepped; a second row is reported as
   /// [`Error::MultipleRowsReturned`].
   pub async fn fetch_one(
      &self,
      query: impl Into<String>,
      values: Vec<Value>,
   ) -> Result<Option<Row>> {
      let query = query.into();
      let rows: Vec<SqliteRow> = self
         .inner
         .read(move |conn| {
            Box::pin(async move {
               let mut rows = Vec::with_capacity(2);
               let mut stream = bind_values(sqlx::query(&query), values).fetch(&mut *conn);
               while let Some(row) = stream.try_next().await? {
                  rows.push(row);
                  if rows.len() == 2 {
                     break;
                  }
               }
               Ok(rows)
            })
         })
         .await?;

      match rows.len() {
         0 | 1 => Ok(decode_rows(rows)?.pop()),
         count => Err(Error::MultipleRowsReturned(count)),
      }
   }

   /// Start delivering committed changes to subscribers.
   #[cfg(feature = "observer")]
   pub async fn observe(
      &self,
      config: sqlx_sqlite_observer::ObserverConfig,
   ) -> Result<sqlx_sqlite_observer::ObservableSqliteDatabase> {
      let observed =
         sqlx_sqlite_observer::ObservableSqliteDatabase::new(Arc::clone(&self.inner), config)
            .await?;
      Ok(observed)
   }

   /// Close the database connection
   pub async fn close(self) -> Result<()> {
      // Close via Arc (handles both owned and shared cases)
      self.inner.close().await?;
      Ok(())
   }

   /// Close the database connection and remove all database files
   pub async fn remove(self) -> Result<()> {
      self.inner.remove().await?;
      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use tempfile::TempDir;

   async fn create_test_db() -> (DatabaseWrapper, TempDir) {
      let temp_dir = TempDir::new().expect("Failed to create temp dir");
      let db_path = temp_dir.path().join("test.db");

      let wrapper = DatabaseWrapper::connect(db_path, None)
         .await
         .expect("Failed to connect to test database");

      (wrapper, temp_dir)
   }

   async fn create_users(db: &DatabaseWrapper) {
      db.execute(
         "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, age INTEGER)",
         vec![],
      )
      .await
      .unwrap();
   }

   #[tokio::test]
   async fn test_execute_reports_write_result() {
      let (db, _temp) = create_test_db().await;
      create_users(&db).await;

      let result = db
         .execute(
            "INSERT INTO users (name, age) VALUES ($1, $2)",
            vec![Value::from("Alice"), Value::from(30)],
         )
         .await
         .unwrap();
      assert_eq!(result.rows_affected, 1);
      assert_eq!(result.last_insert_id, 1);

      let result = db
         .execute("UPDATE users SET age = age + 1", vec![])
         .await
         .unwrap();
      assert_eq!(result.rows_affected, 1);

      db.close().await.unwrap();
   }

   #[tokio::test]
   async fn test_fetch_all_decodes_rows() {
      let (db, _temp) = create_test_db().await;
      create_users(&db).await;

      for (name, age) in [("Alice", Some(30)), ("Bob", None)] {
         db.execute(
            "INSERT INTO users (name, age) VALUES ($1, $2)",
            vec![Value::from(name), Value::from(age)],
         )
         .await
         .unwrap();
      }

      let rows = db
         .fetch_all("SELECT name, age FROM users ORDER BY id", vec![])
         .await
         .unwrap();

      assert_eq!(rows.len(), 2);
      assert_eq!(rows[0].try_get::<String, _>("name").unwrap(), "Alice");
      assert_eq!(rows[0].try_get::<i64, _>("age").unwrap(), 30);
      assert_eq!(rows[1]["age"], Value::Null);

      db.close().await.unwrap();
   }

   #[tokio::test]
   async fn test_fetch_all_with_parameters() {
      let (db, _temp) = create_test_db().await;
      create_users(&db).await;
      db.execute(
         "INSERT INTO users (name, age) VALUES ('a', 1), ('b', 2), ('c', 3)",
         vec![],
      )
      .await
      .unwrap();

      let rows = db
         .fetch_all(
            "SELECT name FROM users WHERE age >= $1 ORDER BY age",
            vec![Value::from(2)],
         )
         .await
         .unwrap();
      let names: Vec<String> = rows.iter().map(|r| r.try_get("name").unwrap()).collect();
      assert_eq!(names, vec!["b", "c"]);

      db.close().await.unwrap();
   }

   #[tokio::test]
   async fn test_fetch_one_zero_one_many() {
      let (db, _temp) = create_test_db().await;
      create_users(&db).await;

      let none = db.fetch_one("SELECT * FROM users", vec![]).await.unwrap();
      assert!(none.is_none());

      db.execute("INSERT INTO users (name) VALUES ('a')", vec![])
         .await
         .unwrap();
      let one = db
         .fetch_one("SELECT name FROM users", vec![])
         .await
         .unwrap()
         .unwrap();
      assert_eq!(one["name"], Value::Text("a".into()));

      db.execute("INSERT INTO users (name) VALUES ('b'), ('c')", vec![])
         .await
         .unwrap();
      let err = db
         .fetch_one("SELECT name FROM users", vec![])
         .await
         .unwrap_err();
      assert!(matches!(err, Error::MultipleRowsReturned(2)));

      db.close().await.unwrap();
   }

   #[tokio::test]
   async fn test_fetch_one_respects_existing_limit() {
      let (db, _temp) = create_test_db().await;
      create_users(&db).await;
      db.execute("INSERT INTO users (name) VALUES ('a'), ('b')", vec![])
         .await
         .unwrap();

      let row = db
         .fetch_one("SELECT name FROM users ORDER BY name LIMIT 1;", vec![])
         .await
         .unwrap();
      assert_eq!(row.unwrap()["name"], Value::Text("a".into()));

      db.close().await.unwrap();
   }

   #[tokio::test]
   async fn test_execute_transaction_commits_all() {
      let (db, _temp) = create_test_db().await;
      create_users(&db).await;

      let results = db
         .execute_transaction(vec![
            Statement::new("INSERT INTO users (name) VALUES ($1)", vec![Value::from("a")]),
            Statement::new("INSERT INTO users (name) VALUES ($1)", vec![Value::from("b")]),
         ])
         .await
         .unwrap();
      assert_eq!(results.len(), 2);
      assert_eq!(results[1].last_insert_id, 2);

      let rows = db.fetch_all("SELECT * FROM users", vec![]).await.unwrap();
      assert_eq!(rows.len(), 2);

      db.close().await.unwrap();
   }

   #[tokio::test]
   async fn test_execute_transaction_rolls_back_on_failure() {
      let (db, _temp) = create_test_db().await;
      create_users(&db).await;

      let err = db
         .execute_transaction(vec![
            Statement::from(("INSERT INTO users (name) VALUES ('dup')", vec![])),
            Statement::new("INSERT INTO users (name) VALUES ('dup')", vec![]),
         ])
         .await
         .unwrap_err();
      assert!(err.error_code().starts_with("SQLITE_"), "{}", err.error_code());

      let rows = db.fetch_all("SELECT * FROM users", vec![]).await.unwrap();
      assert!(rows.is_empty());

      // Writer is usable again after the rollback
      db.execute("INSERT INTO users (name) VALUES ('ok')", vec![])
         .await
         .unwrap();

      db.close().await.unwrap();
   }

   #[tokio::test]
   async fn test_execute_in_savepoint() {
      let (db, _temp) = create_test_db().await;
      create_users(&db).await;

      db.execute_in_savepoint(
         "bulk load",
         vec![Statement::new("INSERT INTO users (name) VALUES ('a')", vec![])],
      )
      .await
      .unwrap();

      let err = db
         .execute_in_savepoint(
            "bulk load",
            vec![
               Statement::new("INSERT INTO users (name) VALUES ('b')", vec![]),
               Statement::new("INSERT INTO missing VALUES (1)", vec![]),
            ],
         )
         .await;
      assert!(err.is_err());

      let rows = db
         .fetch_all("SELECT name FROM users", vec![])
         .await
         .unwrap();
      assert_eq!(rows.len(), 1);

      db.close().await.unwrap();
   }

   #[tokio::test]
   async fn test_value_kinds_survive_storage() {
      let (db, _temp) = create_test_db().await;
      db.execute("CREATE TABLE kinds (i INTEGER, r REAL, t TEXT, b BLOB, n)", vec![])
         .await
         .unwrap();
      db.execute(
         "INSERT INTO kinds VALUES ($1, $2, $3, $4, $5)",
         vec![
            Value::from(i64::MIN),
            Value::from(0.25),
            Value::from("héllo"),
            Value::from(vec![0u8, 255]),
            Value::Null,
         ],
      )
      .await
      .unwrap();

      let row = db
         .fetch_one("SELECT * FROM kinds", vec![])
         .await
         .unwrap()
         .unwrap();
      assert_eq!(
         row.values(),
         &[
            Value::Integer(i64::MIN),
            Value::Real(0.25),
            Value::Text("héllo".into()),
            Value::Blob(vec![0, 255]),
            Value::Null,
         ]
      );

      db.close().await.unwrap();
   }

   #[tokio::test]
   async fn test_operations_after_close_fail() {
      let (db, _temp) = create_test_db().await;
      let other = db.clone();
      db.close().await.unwrap();

      let err = other.fetch_all("SELECT 1", vec![]).await.unwrap_err();
      assert_eq!(err.error_code(), "DATABASE_CLOSED");
   }

   #[tokio::test]
   async fn test_remove_deletes_files() {
      let (db, temp) = create_test_db().await;
      create_users(&db).await;
      let path = temp.path().join("test.db");
      assert!(path.exists());

      db.remove().await.unwrap();
      assert!(!path.exists());
   }
}
