//! SQL text for transactions and savepoints

use std::fmt;

/// Locking behaviour of `BEGIN`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionKind {
   /// No locks are taken until the first read or write
   #[default]
   Deferred,
   /// A write lock is taken immediately
   Immediate,
   /// An exclusive lock is taken immediately
   Exclusive,
}

impl TransactionKind {
   pub(crate) fn begin_sql(self) -> &'static str {
      match self {
         TransactionKind::Deferred => "BEGIN DEFERRED TRANSACTION",
         TransactionKind::Immediate => "BEGIN IMMEDIATE TRANSACTION",
         TransactionKind::Exclusive => "BEGIN EXCLUSIVE TRANSACTION",
      }
   }
}

impl fmt::Display for TransactionKind {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         TransactionKind::Deferred => "deferred",
         TransactionKind::Immediate => "immediate",
         TransactionKind::Exclusive => "exclusive",
      })
   }
}

pub(crate) const COMMIT_SQL: &str = "COMMIT TRANSACTION";
pub(crate) const ROLLBACK_SQL: &str = "ROLLBACK TRANSACTION";

/// Statements used to open, release and undo one named savepoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SavepointSql {
   pub begin: String,
   pub release: String,
   pub rollback: String,
}

impl SavepointSql {
   pub fn new(name: &str) -> Self {
      let name = quote_identifier(name);
      Self {
         begin: format!("SAVEPOINT {name}"),
         release: format!("RELEASE SAVEPOINT {name}"),
         rollback: format!("ROLLBACK TO SAVEPOINT {name}"),
      }
   }
}

/// Quotes a SQLite identifier so user-supplied names cannot inject SQL.
pub fn quote_identifier(name: &str) -> String {
   // Double any existing double quotes and wrap in double quotes
   format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal for statements that cannot take bound parameters.
pub fn quote_literal(value: &str) -> String {
   format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_quote_identifier() {
      assert_eq!(quote_identifier("users"), "\"users\"");
      assert_eq!(quote_identifier("my table"), "\"my table\"");
      assert_eq!(quote_identifier("foo\"bar"), "\"foo\"\"bar\"");
   }

   #[test]
   fn test_quote_literal() {
      assert_eq!(quote_literal("/tmp/backup.db"), "'/tmp/backup.db'");
      assert_eq!(quote_literal("it's"), "'it''s'");
   }

   #[test]
   fn test_savepoint_sql_escapes_name() {
      let sql = SavepointSql::new("a\"; DROP TABLE t; --");
      assert_eq!(sql.begin, "SAVEPOINT \"a\"\"; DROP TABLE t; --\"");
      assert_eq!(sql.release, "RELEASE SAVEPOINT \"a\"\"; DROP TABLE t; --\"");
      assert_eq!(sql.rollback, "ROLLBACK TO SAVEPOINT \"a\"\"; DROP TABLE t; --\"");
   }

   #[test]
   fn test_begin_sql() {
      assert_eq!(TransactionKind::default(), TransactionKind::Deferred);
      assert_eq!(
         TransactionKind::Immediate.begin_sql(),
         "BEGIN IMMEDIATE TRANSACTION"
      );
      assert_eq!(TransactionKind::Exclusive.to_string(), "exclusive");
   }
}
