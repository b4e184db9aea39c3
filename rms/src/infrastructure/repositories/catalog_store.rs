// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Catalog Store
//!
//! The transactional SQLite store behind the registry. It exposes a
//! single mutation entry point, [`CatalogStore::execute_atomic`]: every
//! statement of a logical mutation runs inside one transaction, and any
//! failure rolls the whole batch back. Partial writes across the
//! catalog's tables are impossible by construction.
//!
//! Reads return raw rows; decoding rows into entities is the registry's
//! job, which keeps the store free of domain knowledge.
//!
//! SQLite serializes writers; readers run concurrently under WAL. That
//! satisfies the single-writer discipline the catalog requires without
//! additional locking here.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use tracing::debug;

use rms_domain::RmsError;

use super::schema;

/// A parameter value bound into a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Null,
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Integer(i)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Integer(i64::from(b))
    }
}

impl From<Option<String>> for SqlValue {
    fn from(o: Option<String>) -> Self {
        match o {
            Some(s) => SqlValue::Text(s),
            None => SqlValue::Null,
        }
    }
}

/// One parameterized SQL statement.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self { sql: sql.into(), params }
    }
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    params: &'q [SqlValue],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for p in params {
        query = match p {
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

/// The transactional relational store persisting every entity and
/// relation of the catalog.
#[derive(Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    /// Opens (creating if missing) a catalog database file and brings its
    /// schema up to date.
    pub async fn open(path: &Path) -> Result<Self, RmsError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| {
                RmsError::catalog_error(format!("cannot open catalog {}: {}", path.display(), e))
            })?;
        let store = Self { pool };
        store.initialize().await?;
        debug!(path = %path.display(), "opened catalog");
        Ok(store)
    }

    /// Opens an in-memory catalog, useful for tests.
    pub async fn in_memory() -> Result<Self, RmsError> {
        // A single connection keeps every query on the same in-memory
        // database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| RmsError::catalog_error(format!("cannot open in-memory catalog: {e}")))?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<(), RmsError> {
        schema::ensure_schema(&self.pool).await?;
        schema::ensure_database_id(&self.pool).await?;
        Ok(())
    }

    /// The per-database unique id from the bootstrap row.
    pub async fn database_id(&self) -> Result<String, RmsError> {
        schema::ensure_database_id(&self.pool).await
    }

    /// Runs every statement inside one transaction.
    ///
    /// # Errors
    /// `RmsError::CatalogError` when any statement fails; the transaction
    /// is rolled back and no table shows partial effects.
    pub async fn execute_atomic(&self, statements: &[Statement]) -> Result<(), RmsError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RmsError::catalog_error(format!("cannot begin transaction: {e}")))?;
        for stmt in statements {
            bind_params(sqlx::query(&stmt.sql), &stmt.params)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    RmsError::catalog_error(format!("statement failed ({}): {}", stmt.sql, e))
                })?;
        }
        tx.commit()
            .await
            .map_err(|e| RmsError::catalog_error(format!("cannot commit transaction: {e}")))
    }

    /// Fetches all rows of a read statement.
    pub async fn query(&self, stmt: &Statement) -> Result<Vec<SqliteRow>, RmsError> {
        bind_params(sqlx::query(&stmt.sql), &stmt.params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RmsError::catalog_error(format!("query failed ({}): {}", stmt.sql, e)))
    }

    /// Fetches the first column of every row as text.
    pub async fn query_strings(&self, stmt: &Statement) -> Result<Vec<String>, RmsError> {
        use sqlx::Row;
        let rows = self.query(stmt).await?;
        rows.iter()
            .map(|row| {
                row.try_get::<String, _>(0)
                    .map_err(|e| RmsError::catalog_error(format!("row decode failed: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_execute_atomic_commits_batch() {
        let store = CatalogStore::in_memory().await.unwrap();
        store
            .execute_atomic(&[
                Statement::new(
                    "INSERT INTO resources(rid, volatile, description) VALUES(?,?,?)",
                    vec!["a".into(), false.into(), "first".into()],
                ),
                Statement::new(
                    "INSERT INTO resources(rid, volatile, description) VALUES(?,?,?)",
                    vec!["b".into(), true.into(), SqlValue::Null],
                ),
            ])
            .await
            .unwrap();

        let rows = store
            .query(&Statement::new(
                "SELECT rid FROM resources ORDER BY rid",
                vec![],
            ))
            .await
            .unwrap();
        let rids: Vec<String> = rows.iter().map(|r| r.get(0)).collect();
        assert_eq!(rids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_statement_rolls_back_whole_batch() {
        let store = CatalogStore::in_memory().await.unwrap();
        let result = store
            .execute_atomic(&[
                Statement::new(
                    "INSERT INTO resources(rid, volatile, description) VALUES(?,?,?)",
                    vec!["a".into(), false.into(), SqlValue::Null],
                ),
                Statement::new("INSERT INTO no_such_table(x) VALUES(?)", vec!["y".into()]),
            ])
            .await;
        assert!(matches!(result, Err(RmsError::CatalogError(_))));

        let rows = store
            .query(&Statement::new("SELECT rid FROM resources", vec![]))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_database_id_present() {
        let store = CatalogStore::in_memory().await.unwrap();
        assert_eq!(store.database_id().await.unwrap().len(), 32);
    }
}
