//! End-to-end tests of DatabaseWrapper against file databases

use std::sync::Arc;
use std::time::Duration;

use sqlx_sqlite_conn_mgr::SqliteDatabaseConfig;
use sqlx_sqlite_toolkit::{DatabaseWrapper, Error, Statement, Value};
use tempfile::TempDir;
use tokio::sync::Barrier;

async fn setup(config: Option<SqliteDatabaseConfig>) -> (DatabaseWrapper, TempDir) {
   let temp = TempDir::new().unwrap();
   let db = DatabaseWrapper::connect(temp.path().join("app.db"), config)
      .await
      .unwrap();

   db.execute(
      "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT NOT NULL, qty INTEGER NOT NULL)",
      vec![],
   )
   .await
   .unwrap();

   let inserts = (1..=20)
      .map(|i| {
         Statement::new(
            "INSERT INTO items (label, qty) VALUES ($1, $2)",
            vec![Value::from(format!("item-{i}")), Value::from(i)],
         )
      })
      .collect();
   db.execute_transaction(inserts).await.unwrap();

   (db, temp)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_then_pool_drains() {
   let config = SqliteDatabaseConfig {
      drain_delay: Duration::from_millis(100),
      ..Default::default()
   };
   let (db, _temp) = setup(Some(config)).await;

   let barrier = Arc::new(Barrier::new(10));
   let tasks: Vec<_> = (0..10)
      .map(|_| {
         let db = db.clone();
         let barrier = Arc::clone(&barrier);
         tokio::spawn(async move {
            barrier.wait().await;
            db.fetch_all("SELECT label FROM items WHERE qty > $1", vec![Value::from(10)])
               .await
               .unwrap()
               .len()
         })
      })
      .collect();

   for task in tasks {
      assert_eq!(task.await.unwrap(), 10);
   }

   let status = db.inner().reader_status();
   assert_eq!(status.busy, 0);
   assert!(status.available >= 1);

   tokio::time::sleep(Duration::from_millis(400)).await;
   assert_eq!(db.inner().reader_status().available, 1);

   db.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_proceed_during_writes() {
   let (db, _temp) = setup(None).await;

   let writer = {
      let db = db.clone();
      tokio::spawn(async move {
         for i in 0..50 {
            db.execute(
               "UPDATE items SET qty = qty + 1 WHERE id = $1",
               vec![Value::from(i % 20 + 1)],
            )
            .await
            .unwrap();
         }
      })
   };

   for _ in 0..20 {
      let row = db
         .fetch_one("SELECT COUNT(*) AS n FROM items", vec![])
         .await
         .unwrap()
         .unwrap();
      assert_eq!(row.try_get::<i64, _>("n").unwrap(), 20);
   }

   writer.await.unwrap();

   let total = db
      .fetch_one("SELECT SUM(qty) AS total FROM items", vec![])
      .await
      .unwrap()
      .unwrap();
   assert_eq!(total.try_get::<i64, _>("total").unwrap(), 210 + 50);

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_writes_through_read_pool_are_rejected() {
   let (db, _temp) = setup(None).await;

   let err = db
      .fetch_all("DELETE FROM items RETURNING id", vec![])
      .await
      .unwrap_err();
   assert!(err.sqlite_code().is_some(), "unexpected error: {err}");

   let rows = db.fetch_all("SELECT id FROM items", vec![]).await.unwrap();
   assert_eq!(rows.len(), 20);

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_savepoint_inside_closure_transaction() {
   let (db, _temp) = setup(None).await;

   db.inner()
      .write(|conn| {
         Box::pin(async move {
            sqlx::query("BEGIN").execute(&mut *conn).await?;
            sqlx::query("DELETE FROM items WHERE id = 1")
               .execute(&mut *conn)
               .await?;
            Ok(())
         })
      })
      .await
      .unwrap();

   let failed = db
      .execute_in_savepoint(
         "inner",
         vec![
            Statement::new("DELETE FROM items WHERE id = 2", vec![]),
            Statement::new("INSERT INTO items (label) VALUES ('no qty')", vec![]),
         ],
      )
      .await;
   assert!(failed.is_err());

   db.execute("COMMIT", vec![]).await.unwrap();

   let rows = db.fetch_all("SELECT id FROM items", vec![]).await.unwrap();
   assert_eq!(rows.len(), 19);
   assert_eq!(rows[0].try_get::<i64, _>(0).unwrap(), 2);

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_row_json_shape() {
   let (db, _temp) = setup(None).await;

   let row = db
      .fetch_one(
         "SELECT id, label, qty, x'48656c6c6f' AS raw FROM items WHERE id = $1",
         vec![Value::from(3)],
      )
      .await
      .unwrap()
      .unwrap();

   let json = serde_json::to_value(&row).unwrap();
   assert_eq!(
      json,
      serde_json::json!({"id": 3, "label": "item-3", "qty": 3, "raw": "SGVsbG8="})
   );

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_read_only_database_reports_open_error() {
   let temp = TempDir::new().unwrap();
   let db = DatabaseWrapper::connect(temp.path().join("fresh.db"), None)
      .await
      .unwrap();

   std::fs::remove_file(temp.path().join("fresh.db")).unwrap();
   let _ = std::fs::remove_file(temp.path().join("fresh.db-wal"));
   let _ = std::fs::remove_file(temp.path().join("fresh.db-shm"));

   let err = db.fetch_all("SELECT 1", vec![]).await.unwrap_err();
   assert!(
      matches!(&err, Error::ConnectionManager(e) if e.is_open_failure()),
      "unexpected error: {err}"
   );
   assert_eq!(db.inner().reader_status().total(), 0);
}
