// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Catalog Search
//!
//! SQL-backed lookups: the single live file per path, pipes by identity,
//! and the task finders. Task deduplication is
//! [`Registry::find_tasks_by_pipe_and_args`]: an INTERSECT across one
//! subquery per argument, then an exact-arity filter, so only tasks whose
//! full argument lists match are returned.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::warn;

use rms_domain::value_objects::{info_keys, FileId, PipeFunc, PipeId, ResourceId, TaskId};
use rms_domain::{ArgValue, FileResource, Pipe, RmsError, Task};

use super::Registry;
use crate::infrastructure::repositories::{SqlValue, Statement};

/// Which side of a task's ledger to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    /// Arguments only.
    Input,
    /// Return values and output files only.
    Output,
    /// Both sides.
    Both,
}

impl IoKind {
    fn includes_input(self) -> bool {
        matches!(self, IoKind::Input | IoKind::Both)
    }

    fn includes_output(self) -> bool {
        matches!(self, IoKind::Output | IoKind::Both)
    }
}

impl Registry {
    /// The single live (not overwritten, not deprecated) file resource
    /// registered at the absolute form of `path`.
    ///
    /// # Errors
    /// - `Ambiguous` when more than one live record covers the path
    /// - `NotRegistered` when none does; the message distinguishes a
    ///   never-registered path from one whose records were all
    ///   overwritten or deprecated
    pub async fn file_from_path(&self, path: &Path) -> Result<FileResource, RmsError> {
        let abs = std::path::absolute(path)
            .map_err(|e| RmsError::io_error(format!("cannot absolutize {}: {}", path.display(), e)))?;
        let fids = self
            .catalog
            .query_strings(&Statement::new(
                "SELECT fid FROM files WHERE file_path = ?",
                vec![abs.to_string_lossy().to_string().into()],
            ))
            .await?;

        let mut live = Vec::new();
        for fid_str in &fids {
            let fid = FileId::parse(fid_str)?;
            let file = self.get_file_resource(&fid, false).await?;
            if !file.info.contains_key(info_keys::OVERWRITTEN)
                && !file.info.contains_key(info_keys::DEPRECATED)
            {
                live.push(file);
            }
        }
        if live.len() > 1 {
            return Err(RmsError::Ambiguous(format!(
                "{} live records for {}",
                live.len(),
                abs.display()
            )));
        }
        match live.pop() {
            Some(file) => Ok(file),
            None if fids.is_empty() => Err(RmsError::NotRegistered(format!(
                "file {} is not registered",
                abs.display()
            ))),
            None => Err(RmsError::NotRegistered(format!(
                "every record for {} is overwritten or deprecated",
                abs.display()
            ))),
        }
    }

    /// Finds the registered pipe with the same identity record as the
    /// given callable, ignoring policy flags.
    pub async fn find_pipe(&self, func: &PipeFunc) -> Result<Pipe, RmsError> {
        let serialized = func.serialized()?;
        let candidates = self
            .catalog
            .query_strings(&Statement::new(
                "SELECT pid FROM pipes WHERE module_name IS ? AND func_name IS ?",
                vec![func.module_name().into(), func.func_name().into()],
            ))
            .await?;
        let mut matches = Vec::new();
        for pid_str in candidates {
            let pid = PipeId::parse(&pid_str)?;
            let pipe = self.get_pipe(&pid, false).await?;
            if pipe.func.serialized()? == serialized {
                matches.push(pipe);
            }
        }
        if matches.len() > 1 {
            warn!(
                name = %func.qualified_name(),
                count = matches.len(),
                "more than one pipe matches"
            );
        }
        matches
            .into_iter()
            .next()
            .ok_or_else(|| RmsError::not_found(format!("no pipe for {}", func.qualified_name())))
    }

    /// Finds tasks touching any of the given files, resources, or pipes
    /// on the requested side of their ledger.
    ///
    /// `target_tids` restricts the scan to the given tasks; without it
    /// the whole catalog is searched, which can be slow.
    pub async fn find_tasks_by_io(
        &self,
        io: IoKind,
        fids: &[FileId],
        rids: &[ResourceId],
        pids: &[PipeId],
        target_tids: Option<&[TaskId]>,
    ) -> Result<Vec<Task>, RmsError> {
        let tid_filter = match target_tids {
            Some(tids) => {
                let placeholders = vec!["?"; tids.len()].join(",");
                format!(" AND tid IN ({placeholders})")
            }
            None => String::new(),
        };
        let filter_params = |params: &mut Vec<SqlValue>| {
            if let Some(tids) = target_tids {
                params.extend(tids.iter().map(|t| SqlValue::from(t.as_str())));
            }
        };

        let mut subqueries: Vec<String> = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();
        let mut push = |sql: &str, id: &str, params: &mut Vec<SqlValue>| {
            subqueries.push(format!("{sql}{tid_filter}"));
            params.push(id.into());
            filter_params(params);
        };

        for fid in fids {
            if io.includes_input() {
                push("SELECT tid FROM tasks_args_file WHERE fid=?", fid.as_str(), &mut params);
                push("SELECT tid FROM tasks_kwargs_file WHERE fid=?", fid.as_str(), &mut params);
            }
            if io.includes_output() {
                push("SELECT tid FROM tasks_outputfiles WHERE fid=?", fid.as_str(), &mut params);
            }
        }
        for rid in rids {
            if io.includes_input() {
                push("SELECT tid FROM tasks_args_resource WHERE rid=?", rid.as_str(), &mut params);
                push("SELECT tid FROM tasks_kwargs_resource WHERE rid=?", rid.as_str(), &mut params);
            }
            if io.includes_output() {
                push("SELECT tid FROM tasks_returnvalue WHERE rid=?", rid.as_str(), &mut params);
            }
        }
        for pid in pids {
            if io.includes_input() {
                push("SELECT tid FROM tasks_args_pipe WHERE pid=?", pid.as_str(), &mut params);
                push("SELECT tid FROM tasks_kwargs_pipe WHERE pid=?", pid.as_str(), &mut params);
            }
        }

        if subqueries.is_empty() {
            return Ok(Vec::new());
        }
        let sql = subqueries.join(" UNION ");
        let tids = self.catalog.query_strings(&Statement::new(sql, params)).await?;

        let mut tasks = Vec::with_capacity(tids.len());
        for tid_str in tids {
            let tid = TaskId::parse(&tid_str)?;
            tasks.push(self.get_task(&tid, false).await?);
        }
        Ok(tasks)
    }

    /// Every task recorded against any of the given pipes.
    pub async fn find_tasks_by_pipe(&self, pids: &[PipeId]) -> Result<Vec<Task>, RmsError> {
        let mut tids: BTreeSet<String> = BTreeSet::new();
        for pid in pids {
            let found = self
                .catalog
                .query_strings(&Statement::new(
                    "SELECT tid FROM tasks WHERE pid=?",
                    vec![pid.as_str().into()],
                ))
                .await?;
            tids.extend(found);
        }
        let mut tasks = Vec::with_capacity(tids.len());
        for tid_str in tids {
            let tid = TaskId::parse(&tid_str)?;
            tasks.push(self.get_task(&tid, false).await?);
        }
        Ok(tasks)
    }

    /// The deduplication query: tasks of the given pipe whose argument
    /// lists match element-wise, with exact arity.
    ///
    /// `any_input` adds position-independent containment requirements on
    /// top of the positional/keyword matches.
    pub async fn find_tasks_by_pipe_and_args(
        &self,
        pid: &PipeId,
        args: &[ArgValue],
        kwargs: &BTreeMap<String, ArgValue>,
        any_input: &[ArgValue],
    ) -> Result<Vec<Task>, RmsError> {
        let mut subqueries: Vec<String> = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();

        subqueries.push("SELECT tid FROM tasks WHERE pid=?".to_string());
        params.push(pid.as_str().into());

        for (position, arg) in args.iter().enumerate() {
            let (sql, value) = match arg {
                ArgValue::ResourceRef(rid) => (
                    "SELECT tid FROM tasks_args_resource WHERE arg_order=? AND rid=?",
                    SqlValue::from(rid.as_str()),
                ),
                ArgValue::FileRef(fid) => (
                    "SELECT tid FROM tasks_args_file WHERE arg_order=? AND fid=?",
                    SqlValue::from(fid.as_str()),
                ),
                ArgValue::PipeRef(p) => (
                    "SELECT tid FROM tasks_args_pipe WHERE arg_order=? AND pid=?",
                    SqlValue::from(p.as_str()),
                ),
                ArgValue::Json(v) => (
                    "SELECT tid FROM tasks_args_json WHERE arg_order=? AND arg_value=?",
                    SqlValue::Text(ArgValue::canonical_json(v)),
                ),
            };
            subqueries.push(sql.to_string());
            params.push((position as i64).into());
            params.push(value);
        }

        for (key, arg) in kwargs {
            let (sql, value) = match arg {
                ArgValue::ResourceRef(rid) => (
                    "SELECT tid FROM tasks_kwargs_resource WHERE arg_key=? AND rid=?",
                    SqlValue::from(rid.as_str()),
                ),
                ArgValue::FileRef(fid) => (
                    "SELECT tid FROM tasks_kwargs_file WHERE arg_key=? AND fid=?",
                    SqlValue::from(fid.as_str()),
                ),
                ArgValue::PipeRef(p) => (
                    "SELECT tid FROM tasks_kwargs_pipe WHERE arg_key=? AND pid=?",
                    SqlValue::from(p.as_str()),
                ),
                ArgValue::Json(v) => (
                    "SELECT tid FROM tasks_kwargs_json WHERE arg_key=? AND arg_value=?",
                    SqlValue::Text(ArgValue::canonical_json(v)),
                ),
            };
            subqueries.push(sql.to_string());
            params.push(key.as_str().into());
            params.push(value);
        }

        for arg in any_input {
            let (sql, value) = match arg {
                ArgValue::ResourceRef(rid) => (
                    "(SELECT tid FROM tasks_args_resource WHERE rid=? \
                      UNION SELECT tid FROM tasks_kwargs_resource WHERE rid=?)",
                    SqlValue::from(rid.as_str()),
                ),
                ArgValue::FileRef(fid) => (
                    "(SELECT tid FROM tasks_args_file WHERE fid=? \
                      UNION SELECT tid FROM tasks_kwargs_file WHERE fid=?)",
                    SqlValue::from(fid.as_str()),
                ),
                ArgValue::PipeRef(p) => (
                    "(SELECT tid FROM tasks_args_pipe WHERE pid=? \
                      UNION SELECT tid FROM tasks_kwargs_pipe WHERE pid=?)",
                    SqlValue::from(p.as_str()),
                ),
                ArgValue::Json(v) => (
                    "(SELECT tid FROM tasks_args_json WHERE arg_value=? \
                      UNION SELECT tid FROM tasks_kwargs_json WHERE arg_value=?)",
                    SqlValue::Text(ArgValue::canonical_json(v)),
                ),
            };
            subqueries.push(sql.to_string());
            params.push(value.clone());
            params.push(value);
        }

        let sql = subqueries.join(" INTERSECT ");
        let tids = self.catalog.query_strings(&Statement::new(sql, params)).await?;

        // The INTERSECT guarantees containment; arity must match exactly.
        let mut tasks = Vec::new();
        for tid_str in tids {
            let tid = TaskId::parse(&tid_str)?;
            let task = self.get_task(&tid, false).await?;
            if task.args.len() == args.len() && task.kwargs.len() == kwargs.len() {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }
}
