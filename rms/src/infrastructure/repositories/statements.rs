// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Statement builders for catalog mutations.
//!
//! Each builder returns the full statement batch for one entity,
//! including its tag and info sidecar rows and, for tasks, the four
//! per-kind argument tables and the return-value / output-file join
//! tables. The registry assembles batches from these builders and hands
//! them to `CatalogStore::execute_atomic` as one transaction.

use rms_domain::value_objects::ArgValue;
use rms_domain::{EntryKind, FileResource, FullId, Pipe, Resource, RmsError, Task};

use super::catalog_store::{SqlValue, Statement};

fn opt_text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

/// Main table name for a persistent entry kind.
fn table(kind: EntryKind) -> Result<&'static str, RmsError> {
    match kind {
        EntryKind::Pipe => Ok("pipes"),
        EntryKind::Resource => Ok("resources"),
        EntryKind::FileResource => Ok("files"),
        EntryKind::Task => Ok("tasks"),
        other => Err(RmsError::invalid_input(format!(
            "{} entries are not persisted",
            other
        ))),
    }
}

/// Id column name for a persistent entry kind.
fn id_column(kind: EntryKind) -> Result<&'static str, RmsError> {
    match kind {
        EntryKind::Pipe => Ok("pid"),
        EntryKind::Resource => Ok("rid"),
        EntryKind::FileResource => Ok("fid"),
        EntryKind::Task => Ok("tid"),
        other => Err(RmsError::invalid_input(format!(
            "{} entries are not persisted",
            other
        ))),
    }
}

/// Sidecar table prefix for a persistent entry kind.
fn sidecar_prefix(kind: EntryKind) -> Result<&'static str, RmsError> {
    match kind {
        EntryKind::Pipe => Ok("pipe"),
        EntryKind::Resource => Ok("resource"),
        EntryKind::FileResource => Ok("file"),
        EntryKind::Task => Ok("task"),
        other => Err(RmsError::invalid_input(format!(
            "{} entries have no sidecar tables",
            other
        ))),
    }
}

fn tag_statements(kind: EntryKind, id: &str, tags: &rms_domain::Tags) -> Result<Vec<Statement>, RmsError> {
    let prefix = sidecar_prefix(kind)?;
    let col = id_column(kind)?;
    Ok(tags
        .iter()
        .map(|t| {
            Statement::new(
                format!("INSERT INTO {prefix}_tags({col}, tag_value) VALUES(?,?)"),
                vec![opt_text(id), opt_text(t)],
            )
        })
        .collect())
}

fn info_statements(
    kind: EntryKind,
    id: &str,
    info: &rms_domain::InfoMap,
) -> Result<Vec<Statement>, RmsError> {
    let prefix = sidecar_prefix(kind)?;
    let col = id_column(kind)?;
    Ok(info
        .iter()
        .map(|(k, v)| {
            Statement::new(
                format!("INSERT INTO {prefix}_info({col}, info_key, info_value) VALUES(?,?,?)"),
                vec![opt_text(id), opt_text(k), opt_text(v)],
            )
        })
        .collect())
}

/// Inserts one info row, used for `overwritten` and `deprecated` markers.
pub fn info_marker(full_id: &FullId, key: &str, value: &str) -> Result<Statement, RmsError> {
    let prefix = sidecar_prefix(full_id.kind())?;
    let col = id_column(full_id.kind())?;
    Ok(Statement::new(
        format!("INSERT INTO {prefix}_info({col}, info_key, info_value) VALUES(?,?,?)"),
        vec![opt_text(full_id.id_str()), opt_text(key), opt_text(value)],
    ))
}

/// Statement batch inserting a pipe with its sidecars.
pub fn insert_pipe(pipe: &Pipe) -> Result<Vec<Statement>, RmsError> {
    let func_text = pipe.func.serialized()?;
    let output_text = match &pipe.output_func {
        Some(f) => SqlValue::Text(f.serialized()?),
        None => SqlValue::Null,
    };
    let mut stmts = vec![Statement::new(
        "INSERT INTO pipes(pid, func, return_volatile, is_deterministic, module_name, func_name, \
         output_func, description) VALUES(?,?,?,?,?,?,?,?)",
        vec![
            opt_text(pipe.id.as_str()),
            SqlValue::Text(func_text),
            pipe.return_volatile.into(),
            pipe.is_deterministic.into(),
            opt_text(pipe.module_name()),
            opt_text(pipe.func_name()),
            output_text,
            opt_text(&pipe.description),
        ],
    )];
    stmts.extend(tag_statements(EntryKind::Pipe, pipe.id.as_str(), &pipe.tags)?);
    stmts.extend(info_statements(EntryKind::Pipe, pipe.id.as_str(), &pipe.info)?);
    Ok(stmts)
}

/// Statement batch inserting a resource with its sidecars.
///
/// Content is not a column; it lives in memory or the content store.
pub fn insert_resource(resource: &Resource) -> Result<Vec<Statement>, RmsError> {
    let mut stmts = vec![Statement::new(
        "INSERT INTO resources(rid, volatile, description) VALUES(?,?,?)",
        vec![
            opt_text(resource.id.as_str()),
            resource.volatile.into(),
            opt_text(&resource.description),
        ],
    )];
    stmts.extend(tag_statements(
        EntryKind::Resource,
        resource.id.as_str(),
        &resource.tags,
    )?);
    stmts.extend(info_statements(
        EntryKind::Resource,
        resource.id.as_str(),
        &resource.info,
    )?);
    Ok(stmts)
}

/// Statement batch inserting a file resource with its sidecars.
pub fn insert_file(file: &FileResource) -> Result<Vec<Statement>, RmsError> {
    let mut stmts = vec![Statement::new(
        "INSERT INTO files(fid, file_path, md5, description) VALUES(?,?,?,?)",
        vec![
            opt_text(file.id.as_str()),
            opt_text(&file.file_path.to_string_lossy()),
            file.md5.clone().into(),
            opt_text(&file.description),
        ],
    )];
    stmts.extend(tag_statements(EntryKind::FileResource, file.id.as_str(), &file.tags)?);
    stmts.extend(info_statements(EntryKind::FileResource, file.id.as_str(), &file.info)?);
    Ok(stmts)
}

fn arg_statement(tid: &str, position: usize, arg: &ArgValue) -> Statement {
    match arg {
        ArgValue::ResourceRef(rid) => Statement::new(
            "INSERT INTO tasks_args_resource(tid, arg_order, rid) VALUES(?,?,?)",
            vec![opt_text(tid), (position as i64).into(), opt_text(rid.as_str())],
        ),
        ArgValue::FileRef(fid) => Statement::new(
            "INSERT INTO tasks_args_file(tid, arg_order, fid) VALUES(?,?,?)",
            vec![opt_text(tid), (position as i64).into(), opt_text(fid.as_str())],
        ),
        ArgValue::PipeRef(pid) => Statement::new(
            "INSERT INTO tasks_args_pipe(tid, arg_order, pid) VALUES(?,?,?)",
            vec![opt_text(tid), (position as i64).into(), opt_text(pid.as_str())],
        ),
        ArgValue::Json(v) => Statement::new(
            "INSERT INTO tasks_args_json(tid, arg_order, arg_value) VALUES(?,?,?)",
            vec![
                opt_text(tid),
                (position as i64).into(),
                SqlValue::Text(ArgValue::canonical_json(v)),
            ],
        ),
    }
}

fn kwarg_statement(tid: &str, key: &str, arg: &ArgValue) -> Statement {
    match arg {
        ArgValue::ResourceRef(rid) => Statement::new(
            "INSERT INTO tasks_kwargs_resource(tid, arg_key, rid) VALUES(?,?,?)",
            vec![opt_text(tid), opt_text(key), opt_text(rid.as_str())],
        ),
        ArgValue::FileRef(fid) => Statement::new(
            "INSERT INTO tasks_kwargs_file(tid, arg_key, fid) VALUES(?,?,?)",
            vec![opt_text(tid), opt_text(key), opt_text(fid.as_str())],
        ),
        ArgValue::PipeRef(pid) => Statement::new(
            "INSERT INTO tasks_kwargs_pipe(tid, arg_key, pid) VALUES(?,?,?)",
            vec![opt_text(tid), opt_text(key), opt_text(pid.as_str())],
        ),
        ArgValue::Json(v) => Statement::new(
            "INSERT INTO tasks_kwargs_json(tid, arg_key, arg_value) VALUES(?,?,?)",
            vec![opt_text(tid), opt_text(key), SqlValue::Text(ArgValue::canonical_json(v))],
        ),
    }
}

/// Statement batch inserting a task: argument rows, return-value and
/// output-file joins, the main row, and the sidecars.
pub fn insert_task(task: &Task) -> Result<Vec<Statement>, RmsError> {
    let tid = task.id.as_str();
    let mut stmts = Vec::new();
    for (i, arg) in task.args.iter().enumerate() {
        stmts.push(arg_statement(tid, i, arg));
    }
    for (key, arg) in &task.kwargs {
        stmts.push(kwarg_statement(tid, key, arg));
    }
    for rid in &task.return_values {
        stmts.push(Statement::new(
            "INSERT INTO tasks_returnvalue(tid, rid) VALUES(?,?)",
            vec![opt_text(tid), opt_text(rid.as_str())],
        ));
    }
    for (i, fid) in task.output_files.iter().enumerate() {
        stmts.push(Statement::new(
            "INSERT INTO tasks_outputfiles(tid, forder, fid) VALUES(?,?,?)",
            vec![opt_text(tid), (i as i64).into(), opt_text(fid.as_str())],
        ));
    }
    stmts.push(Statement::new(
        "INSERT INTO tasks(tid, pid, begin_time, end_time, description) VALUES(?,?,?,?,?)",
        vec![
            opt_text(tid),
            opt_text(task.pipe_id.as_str()),
            opt_text(&task.begin_time.to_rfc3339()),
            opt_text(&task.end_time.to_rfc3339()),
            opt_text(&task.description),
        ],
    ));
    stmts.extend(tag_statements(EntryKind::Task, tid, &task.tags)?);
    stmts.extend(info_statements(EntryKind::Task, tid, &task.info)?);
    Ok(stmts)
}

/// Per-kind column whitelist for direct updates.
fn updatable_columns(kind: EntryKind) -> &'static [&'static str] {
    match kind {
        EntryKind::Pipe => &["description"],
        EntryKind::Resource => &["description", "volatile"],
        EntryKind::FileResource => &["description", "file_path", "md5"],
        EntryKind::Task => &["description"],
        _ => &[],
    }
}

/// Column-level update of one entry.
pub fn update_columns(
    full_id: &FullId,
    fields: &[(&str, SqlValue)],
) -> Result<Statement, RmsError> {
    if fields.is_empty() {
        return Err(RmsError::invalid_input("no fields to update"));
    }
    let kind = full_id.kind();
    let allowed = updatable_columns(kind);
    for (col, _) in fields {
        if !allowed.contains(col) {
            return Err(RmsError::invalid_input(format!(
                "column '{}' of {} entries is not updatable",
                col, kind
            )));
        }
    }
    let assignments: Vec<String> = fields.iter().map(|(col, _)| format!("{col} = ?")).collect();
    let mut params: Vec<SqlValue> = fields.iter().map(|(_, v)| v.clone()).collect();
    params.push(opt_text(full_id.id_str()));
    Ok(Statement::new(
        format!(
            "UPDATE {} SET {} WHERE {} = ?",
            table(kind)?,
            assignments.join(", "),
            id_column(kind)?
        ),
        params,
    ))
}

/// Statement batch removing one entry and all rows keyed by its id.
pub fn delete_entry(full_id: &FullId) -> Result<Vec<Statement>, RmsError> {
    let id = full_id.id_str();
    let by_id = |sql: &str| Statement::new(sql, vec![opt_text(id)]);
    let mut stmts = match full_id.kind() {
        EntryKind::Resource => vec![
            by_id("DELETE FROM resources WHERE rid=?"),
            by_id("DELETE FROM resource_info WHERE rid=?"),
            by_id("DELETE FROM resource_tags WHERE rid=?"),
        ],
        EntryKind::FileResource => vec![
            by_id("DELETE FROM files WHERE fid=?"),
            by_id("DELETE FROM file_info WHERE fid=?"),
            by_id("DELETE FROM file_tags WHERE fid=?"),
        ],
        EntryKind::Task => vec![
            by_id("DELETE FROM tasks WHERE tid=?"),
            by_id("DELETE FROM tasks_args_json WHERE tid=?"),
            by_id("DELETE FROM tasks_args_pipe WHERE tid=?"),
            by_id("DELETE FROM tasks_args_file WHERE tid=?"),
            by_id("DELETE FROM tasks_args_resource WHERE tid=?"),
            by_id("DELETE FROM tasks_kwargs_json WHERE tid=?"),
            by_id("DELETE FROM tasks_kwargs_pipe WHERE tid=?"),
            by_id("DELETE FROM tasks_kwargs_file WHERE tid=?"),
            by_id("DELETE FROM tasks_kwargs_resource WHERE tid=?"),
            by_id("DELETE FROM tasks_returnvalue WHERE tid=?"),
            by_id("DELETE FROM tasks_outputfiles WHERE tid=?"),
            by_id("DELETE FROM task_info WHERE tid=?"),
            by_id("DELETE FROM task_tags WHERE tid=?"),
        ],
        EntryKind::Pipe => vec![
            by_id("DELETE FROM pipes WHERE pid=?"),
            by_id("DELETE FROM pipe_info WHERE pid=?"),
            by_id("DELETE FROM pipe_tags WHERE pid=?"),
        ],
        other => {
            return Err(RmsError::invalid_input(format!(
                "{} entries are not persisted",
                other
            )))
        }
    };
    stmts.shrink_to_fit();
    Ok(stmts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rms_domain::value_objects::{FileId, PipeId, ResourceId, TaskId};
    use rms_domain::{InfoMap, Tags};
    use serde_json::json;

    fn sample_task() -> Task {
        let mut kwargs = std::collections::BTreeMap::new();
        kwargs.insert("k".to_string(), ArgValue::Json(json!("v")));
        Task {
            id: TaskId::new(),
            pipe_id: PipeId::new(),
            args: vec![
                ArgValue::Json(json!(1)),
                ArgValue::ResourceRef(ResourceId::new()),
            ],
            kwargs,
            return_values: vec![ResourceId::new()],
            output_files: vec![FileId::new()],
            begin_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            description: "d".to_string(),
            tags: Tags::from(["t".to_string()]),
            info: InfoMap::new(),
        }
    }

    #[test]
    fn test_insert_task_covers_every_table() {
        let stmts = insert_task(&sample_task()).unwrap();
        let sql: Vec<&str> = stmts.iter().map(|s| s.sql.as_str()).collect();
        assert!(sql.iter().any(|s| s.contains("tasks_args_json")));
        assert!(sql.iter().any(|s| s.contains("tasks_args_resource")));
        assert!(sql.iter().any(|s| s.contains("tasks_kwargs_json")));
        assert!(sql.iter().any(|s| s.contains("tasks_returnvalue")));
        assert!(sql.iter().any(|s| s.contains("tasks_outputfiles")));
        assert!(sql.iter().any(|s| s.contains("INSERT INTO tasks(")));
        assert!(sql.iter().any(|s| s.contains("task_tags")));
    }

    #[test]
    fn test_update_rejects_unknown_column() {
        let full_id: FullId = TaskId::new().into();
        let err = update_columns(&full_id, &[("pid", SqlValue::Text("x".into()))]);
        assert!(matches!(err, Err(RmsError::InvalidInput(_))));
    }

    #[test]
    fn test_delete_rejects_virtual_kinds() {
        let full_id: FullId = rms_domain::value_objects::VirtualResourceId::new().into();
        assert!(matches!(delete_entry(&full_id), Err(RmsError::InvalidInput(_))));
    }
}
