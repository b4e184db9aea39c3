// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite schema for the catalog.
//!
//! Creation is idempotent and runs inside one transaction on start-up,
//! so tests and services always see a consistent database. A bootstrap
//! row `metainfo('dbid', <hex>)` gives every catalog a stable identity.

use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use rms_domain::RmsError;

/// Table definitions, applied in order.
///
/// Ids are hex text, timestamps RFC 3339 text, booleans 0/1 integers.
/// Task arguments are split into four tables by argument kind, each
/// keyed by position (positional) or key (keyword).
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS metainfo (
        infokey text NOT NULL,
        infovalue text NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS pipes (
        pid text PRIMARY KEY,
        func text NOT NULL,
        return_volatile integer NOT NULL,
        is_deterministic integer NOT NULL,
        module_name text,
        func_name text,
        output_func text,
        description text
    );",
    "CREATE TABLE IF NOT EXISTS resources (
        rid text PRIMARY KEY,
        volatile integer,
        description text
    );",
    "CREATE TABLE IF NOT EXISTS files (
        fid text PRIMARY KEY,
        file_path text,
        md5 text,
        description text
    );",
    "CREATE TABLE IF NOT EXISTS tasks (
        tid text PRIMARY KEY,
        pid text NOT NULL,
        begin_time text NOT NULL,
        end_time text NOT NULL,
        description text,
        FOREIGN KEY (pid) REFERENCES pipes(pid)
    );",
    "CREATE TABLE IF NOT EXISTS tasks_args_json (
        tid text NOT NULL,
        arg_order integer NOT NULL,
        arg_value text NOT NULL,
        FOREIGN KEY (tid) REFERENCES tasks(tid)
    );",
    "CREATE TABLE IF NOT EXISTS tasks_args_resource (
        tid text NOT NULL,
        arg_order integer NOT NULL,
        rid text NOT NULL,
        FOREIGN KEY (tid) REFERENCES tasks(tid),
        FOREIGN KEY (rid) REFERENCES resources(rid)
    );",
    "CREATE TABLE IF NOT EXISTS tasks_args_file (
        tid text NOT NULL,
        arg_order integer NOT NULL,
        fid text NOT NULL,
        FOREIGN KEY (tid) REFERENCES tasks(tid),
        FOREIGN KEY (fid) REFERENCES files(fid)
    );",
    "CREATE TABLE IF NOT EXISTS tasks_args_pipe (
        tid text NOT NULL,
        arg_order integer NOT NULL,
        pid text NOT NULL,
        FOREIGN KEY (tid) REFERENCES tasks(tid),
        FOREIGN KEY (pid) REFERENCES pipes(pid)
    );",
    "CREATE TABLE IF NOT EXISTS tasks_kwargs_json (
        tid text NOT NULL,
        arg_key text NOT NULL,
        arg_value text NOT NULL,
        FOREIGN KEY (tid) REFERENCES tasks(tid)
    );",
    "CREATE TABLE IF NOT EXISTS tasks_kwargs_resource (
        tid text NOT NULL,
        arg_key text NOT NULL,
        rid text NOT NULL,
        FOREIGN KEY (tid) REFERENCES tasks(tid),
        FOREIGN KEY (rid) REFERENCES resources(rid)
    );",
    "CREATE TABLE IF NOT EXISTS tasks_kwargs_file (
        tid text NOT NULL,
        arg_key text NOT NULL,
        fid text NOT NULL,
        FOREIGN KEY (tid) REFERENCES tasks(tid),
        FOREIGN KEY (fid) REFERENCES files(fid)
    );",
    "CREATE TABLE IF NOT EXISTS tasks_kwargs_pipe (
        tid text NOT NULL,
        arg_key text NOT NULL,
        pid text NOT NULL,
        FOREIGN KEY (tid) REFERENCES tasks(tid),
        FOREIGN KEY (pid) REFERENCES pipes(pid)
    );",
    "CREATE TABLE IF NOT EXISTS tasks_returnvalue (
        tid text NOT NULL,
        rid text NOT NULL,
        FOREIGN KEY (tid) REFERENCES tasks(tid),
        FOREIGN KEY (rid) REFERENCES resources(rid)
    );",
    "CREATE TABLE IF NOT EXISTS tasks_outputfiles (
        tid text NOT NULL,
        forder int NOT NULL,
        fid text NOT NULL,
        FOREIGN KEY (tid) REFERENCES tasks(tid),
        FOREIGN KEY (fid) REFERENCES files(fid)
    );",
    "CREATE TABLE IF NOT EXISTS pipe_tags (
        pid text NOT NULL,
        tag_value text,
        FOREIGN KEY (pid) REFERENCES pipes(pid)
    );",
    "CREATE TABLE IF NOT EXISTS pipe_info (
        pid text NOT NULL,
        info_key text,
        info_value text,
        FOREIGN KEY (pid) REFERENCES pipes(pid)
    );",
    "CREATE TABLE IF NOT EXISTS resource_tags (
        rid text NOT NULL,
        tag_value text,
        FOREIGN KEY (rid) REFERENCES resources(rid)
    );",
    "CREATE TABLE IF NOT EXISTS resource_info (
        rid text NOT NULL,
        info_key text,
        info_value text,
        FOREIGN KEY (rid) REFERENCES resources(rid)
    );",
    "CREATE TABLE IF NOT EXISTS file_tags (
        fid text NOT NULL,
        tag_value text,
        FOREIGN KEY (fid) REFERENCES files(fid)
    );",
    "CREATE TABLE IF NOT EXISTS file_info (
        fid text NOT NULL,
        info_key text,
        info_value text,
        FOREIGN KEY (fid) REFERENCES files(fid)
    );",
    "CREATE TABLE IF NOT EXISTS task_tags (
        tid text NOT NULL,
        tag_value text,
        FOREIGN KEY (tid) REFERENCES tasks(tid)
    );",
    "CREATE TABLE IF NOT EXISTS task_info (
        tid text NOT NULL,
        info_key text,
        info_value text,
        FOREIGN KEY (tid) REFERENCES tasks(tid)
    );",
];

/// Creates any missing tables, inside one transaction.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), RmsError> {
    debug!("ensuring catalog schema is up to date");
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| RmsError::catalog_error(format!("cannot begin schema transaction: {e}")))?;
    for ddl in SCHEMA {
        sqlx::query(ddl)
            .execute(&mut *tx)
            .await
            .map_err(|e| RmsError::catalog_error(format!("schema statement failed: {e}")))?;
    }
    tx.commit()
        .await
        .map_err(|e| RmsError::catalog_error(format!("cannot commit schema: {e}")))?;
    Ok(())
}

/// Inserts the `dbid` bootstrap row when absent and returns the id.
pub async fn ensure_database_id(pool: &SqlitePool) -> Result<String, RmsError> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT infovalue FROM metainfo WHERE infokey = 'dbid'")
            .fetch_optional(pool)
            .await
            .map_err(|e| RmsError::catalog_error(format!("cannot read dbid: {e}")))?;
    if let Some((dbid,)) = existing {
        return Ok(dbid);
    }
    let dbid = Uuid::new_v4().simple().to_string();
    sqlx::query("INSERT INTO metainfo(infokey, infovalue) VALUES(?, ?)")
        .bind("dbid")
        .bind(&dbid)
        .execute(pool)
        .await
        .map_err(|e| RmsError::catalog_error(format!("cannot insert dbid: {e}")))?;
    debug!(dbid = %dbid, "initialized catalog identity");
    Ok(dbid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_schema_creates_all_tables() {
        let pool = memory_pool().await;
        ensure_schema(&pool).await.unwrap();

        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN \
             ('metainfo','pipes','resources','files','tasks','tasks_returnvalue','tasks_outputfiles')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count.0, 7);
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = memory_pool().await;
        ensure_schema(&pool).await.unwrap();
        ensure_schema(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_database_id_is_stable() {
        let pool = memory_pool().await;
        ensure_schema(&pool).await.unwrap();
        let first = ensure_database_id(&pool).await.unwrap();
        let second = ensure_database_id(&pool).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }
}
