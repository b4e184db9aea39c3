// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution Engine
//!
//! Runs pipes against resolved arguments and records the results.
//!
//! `run` is the deduplicating entry point: the argument binding is
//! checked against prior tasks of the same pipe first, and an exact match
//! short-circuits to the recorded return resource without executing
//! anything. On a miss, arguments are resolved (resource references
//! materialize into content, file references into paths, pipe references
//! into callables), declared output paths are computed *before* the body
//! runs so path bugs surface early, the body executes on the calling
//! task, and the finished task is committed - task row, return resource,
//! output file records, and overwrite markers - in a single transaction.
//!
//! Content obtainment implements the volatile one-shot rule and the
//! auto-fetch path: a resource whose content is neither in memory nor in
//! the content store is regenerated by re-executing its upstream lineage,
//! deterministic pipes only, without recording new tasks.
//!
//! Errors from pipe bodies propagate untouched; nothing is recorded and
//! nothing is retried.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use rms_domain::value_objects::{info_keys, FileId, PipeId, ResourceId, RunValue, TaskId};
use rms_domain::{
    ArgValue, Binding, FileResource, FullId, InfoMap, Pipe, Resource, RmsEntry, RmsError, RmsEvent,
    RunAnnotations, Task,
};

use super::Registry;
use crate::infrastructure::repositories::{statements, Statement};

impl Registry {
    /// Runs a pipe, deduplicating against prior identical executions.
    ///
    /// Returns the single return resource - the recorded one on a dedup
    /// hit, a freshly minted one (with in-memory content) otherwise.
    pub async fn run(
        &self,
        pid: &PipeId,
        args: Vec<ArgValue>,
        kwargs: BTreeMap<String, ArgValue>,
        annotations: RunAnnotations,
    ) -> Result<Resource, RmsError> {
        let pipe = self.get_pipe(pid, false).await?;
        let binding: Binding<ArgValue> = Binding::bind(pipe.signature(), args, kwargs)?;
        let (bound_args, bound_kwargs) = binding.flatten();

        let previous = self
            .find_tasks_by_pipe_and_args(pid, &bound_args, &bound_kwargs, &[])
            .await?;
        if let Some(task) = previous.first() {
            debug!(tid = %task.id, "identical task found, skipping execution");
            let rid = task.return_values.first().ok_or_else(|| {
                RmsError::catalog_error(format!("task {} has no return resource", task.id))
            })?;
            return self.get_resource(rid, false).await;
        }

        let (resolved_args, resolved_kwargs) =
            self.resolve_all(&bound_args, &bound_kwargs).await?;

        // Evaluating the output function before the body surfaces
        // output-path computation failures without running anything.
        let declared = compute_output_paths(&pipe, &resolved_args, &resolved_kwargs)?;
        debug!(pipe = %pipe.func.qualified_name(), outputs = declared.len(), "declared output paths");

        let mut task_info = annotations.task_info.clone();
        if let Some(script_id) = self.script_id() {
            task_info
                .entry(info_keys::SCRIPT_ID.to_string())
                .or_insert(script_id);
        }

        let begin_time = Utc::now();
        let value = pipe.func.call(&resolved_args, &resolved_kwargs)?;
        let end_time = Utc::now();

        let task = self
            .register_finished_task(
                &pipe,
                bound_args,
                bound_kwargs,
                &resolved_args,
                &resolved_kwargs,
                value,
                begin_time,
                end_time,
                &annotations,
                task_info,
            )
            .await?;
        let rid = task.return_values.first().ok_or_else(|| {
            RmsError::catalog_error(format!("task {} has no return resource", task.id))
        })?;
        self.get_resource(rid, false).await
    }

    /// Resolves stored arguments into runtime values.
    pub(super) async fn resolve_all(
        &self,
        args: &[ArgValue],
        kwargs: &BTreeMap<String, ArgValue>,
    ) -> Result<(Vec<RunValue>, BTreeMap<String, RunValue>), RmsError> {
        let mut resolved_args = Vec::with_capacity(args.len());
        for arg in args {
            resolved_args.push(self.resolve_run_value(arg).await?);
        }
        let mut resolved_kwargs = BTreeMap::new();
        for (key, arg) in kwargs {
            resolved_kwargs.insert(key.clone(), self.resolve_run_value(arg).await?);
        }
        Ok((resolved_args, resolved_kwargs))
    }

    async fn resolve_run_value(&self, arg: &ArgValue) -> Result<RunValue, RmsError> {
        if let Some(full_id) = arg.referenced_entry() {
            let entry = self.get(&full_id, false).await?;
            if entry.is_overwritten()
                || entry.info().is_some_and(|i| i.contains_key(info_keys::OBSOLETE))
            {
                return Err(RmsError::invalid_input(format!(
                    "{} is overwritten or obsolete and cannot be used as an input",
                    full_id
                )));
            }
        }
        match arg {
            ArgValue::Json(v) => Ok(RunValue::Json(v.clone())),
            ArgValue::ResourceRef(rid) => {
                Ok(RunValue::Json(self.resource_content(rid, true).await?))
            }
            ArgValue::FileRef(fid) => {
                let file = self.get_file_resource(fid, false).await?;
                Ok(RunValue::Path(file.file_path))
            }
            ArgValue::PipeRef(pid) => {
                let pipe = self.get_pipe(pid, false).await?;
                Ok(RunValue::Func(pipe.func))
            }
        }
    }

    /// Materializes a resource's content.
    ///
    /// Order of authority: in-memory content (one-shot for volatile
    /// resources), then the content store (a dumped payload remains
    /// readable even after a volatile in-memory copy was consumed), then
    /// - with `autofetch` - regeneration through upstream lineage
    /// re-execution.
    ///
    /// # Errors
    /// - `ResourceNotReady` when volatile content was consumed and no
    ///   dump exists
    /// - `ContentMissing` when nothing is available and `autofetch` is
    ///   off
    pub async fn resource_content(
        &self,
        rid: &ResourceId,
        autofetch: bool,
    ) -> Result<Value, RmsError> {
        // Make sure the resource is cached at all.
        self.get_resource(rid, false).await?;

        {
            let mut caches = self.caches.write();
            if let Some(resource) = caches.resources.get_mut(rid) {
                if resource.has_content() {
                    return resource.content();
                }
            }
        }

        // On-disk presence is authoritative.
        match self.content.load(rid).await {
            Ok(value) => {
                let mut caches = self.caches.write();
                if let Some(resource) = caches.resources.get_mut(rid) {
                    // Volatile payloads are not re-cached; each read goes
                    // back to the store.
                    if !resource.volatile {
                        resource.set_content(value.clone());
                    }
                }
                return Ok(value);
            }
            Err(RmsError::ContentMissing(_)) => {}
            Err(e) => return Err(e),
        }

        {
            let caches = self.caches.read();
            if let Some(resource) = caches.resources.get(rid) {
                if resource.is_consumed() {
                    return Err(RmsError::resource_not_ready(format!(
                        "volatile content of resource {rid} was already read"
                    )));
                }
            }
        }

        if !autofetch {
            return Err(RmsError::content_missing(format!(
                "content of resource {rid} is unavailable and auto-fetch is disabled"
            )));
        }
        self.auto_fetch(std::slice::from_ref(rid), false).await?;

        let mut caches = self.caches.write();
        let resource = caches
            .resources
            .get_mut(rid)
            .ok_or_else(|| RmsError::not_found(format!("no resource {rid}")))?;
        resource.content()
    }

    /// Dumps a resource's current content into the content store.
    ///
    /// For volatile resources this consumes the in-memory copy; the dump
    /// becomes the authoritative source for later reads.
    pub async fn save_resource_content(&self, rid: &ResourceId) -> Result<(), RmsError> {
        let value = {
            let mut caches = self.caches.write();
            let resource = caches
                .resources
                .get_mut(rid)
                .ok_or_else(|| RmsError::not_found(format!("no resource {rid}")))?;
            resource.content()?
        };
        if let Err(e) = self.content.store(rid, &value).await {
            // Failed dump must not lose the value.
            let mut caches = self.caches.write();
            if let Some(resource) = caches.resources.get_mut(rid) {
                resource.set_content(value);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Regenerates missing content by re-executing upstream lineage.
    ///
    /// No task is recorded for re-executions; each regenerated resource
    /// fires a `ContentChange` event.
    pub async fn auto_fetch(
        &self,
        rids: &[ResourceId],
        allow_non_deterministic: bool,
    ) -> Result<(), RmsError> {
        for rid in rids {
            self.auto_fetch_one(rid, allow_non_deterministic).await?;
        }
        Ok(())
    }

    fn auto_fetch_one<'a>(
        &'a self,
        rid: &'a ResourceId,
        allow_non_deterministic: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), RmsError>> + Send + 'a>> {
        Box::pin(async move {
            let resource = self.get_resource(rid, false).await?;
            if resource.has_content() || self.content.exists(rid).await {
                return Ok(());
            }
            let tid = resource.task_id.ok_or_else(|| {
                RmsError::invalid_input(format!(
                    "resource {rid} has no producing task to re-execute"
                ))
            })?;
            let task = self.get_task(&tid, false).await?;
            let pipe = self.get_pipe(&task.pipe_id, false).await?;
            if !allow_non_deterministic && !pipe.is_deterministic {
                return Err(RmsError::NonDeterministic(format!(
                    "pipe {} is not deterministic; refusing to re-execute",
                    pipe.func.qualified_name()
                )));
            }
            if !task.output_files.is_empty() {
                return Err(RmsError::WouldOverwriteFile(format!(
                    "re-executing task {tid} would overwrite its output files"
                )));
            }
            for input_rid in task.input_resources() {
                self.auto_fetch_one(&input_rid, allow_non_deterministic).await?;
            }
            for fid in task.input_file_resources() {
                let file = self.get_file_resource(&fid, false).await?;
                if !file.file_path.exists() {
                    return Err(RmsError::io_error(format!(
                        "input file {} is missing",
                        file.file_path.display()
                    )));
                }
            }

            info!(rid = %rid, pipe = %pipe.func.qualified_name(), "re-executing lineage for content");
            let value = self
                .run_pipe_unrecorded(&pipe, &task.args, &task.kwargs)
                .await?;
            {
                let mut caches = self.caches.write();
                if let Some(cached) = caches.resources.get_mut(rid) {
                    cached.set_content(value);
                }
            }
            self.events
                .emit(vec![RmsEvent::content_change(FullId::Resource(rid.clone()))]);
            Ok(())
        })
    }

    /// Dry-run of [`Registry::auto_fetch`]: the tasks that would be
    /// re-executed and the resources that would be regenerated, without
    /// executing anything.
    pub async fn auto_fetch_plan(
        &self,
        rids: &[ResourceId],
        allow_non_deterministic: bool,
    ) -> Result<(HashSet<TaskId>, HashSet<ResourceId>), RmsError> {
        let mut tasks = HashSet::new();
        let mut resources = HashSet::new();
        for rid in rids {
            self.auto_fetch_plan_one(rid, allow_non_deterministic, &mut tasks, &mut resources)
                .await?;
        }
        Ok((tasks, resources))
    }

    fn auto_fetch_plan_one<'a>(
        &'a self,
        rid: &'a ResourceId,
        allow_non_deterministic: bool,
        tasks: &'a mut HashSet<TaskId>,
        resources: &'a mut HashSet<ResourceId>,
    ) -> Pin<Box<dyn Future<Output = Result<(), RmsError>> + Send + 'a>> {
        Box::pin(async move {
            if resources.contains(rid) {
                return Ok(());
            }
            let resource = self.get_resource(rid, false).await?;
            if resource.has_content() || self.content.exists(rid).await {
                return Ok(());
            }
            let tid = resource.task_id.ok_or_else(|| {
                RmsError::invalid_input(format!(
                    "resource {rid} has no producing task to re-execute"
                ))
            })?;
            let task = self.get_task(&tid, false).await?;
            let pipe = self.get_pipe(&task.pipe_id, false).await?;
            if !allow_non_deterministic && !pipe.is_deterministic {
                return Err(RmsError::NonDeterministic(format!(
                    "pipe {} is not deterministic; refusing to re-execute",
                    pipe.func.qualified_name()
                )));
            }
            if !task.output_files.is_empty() {
                return Err(RmsError::WouldOverwriteFile(format!(
                    "re-executing task {tid} would overwrite its output files"
                )));
            }
            for fid in task.input_file_resources() {
                let file = self.get_file_resource(&fid, false).await?;
                if !file.file_path.exists() {
                    return Err(RmsError::io_error(format!(
                        "input file {} is missing",
                        file.file_path.display()
                    )));
                }
            }
            for input_rid in task.input_resources() {
                self.auto_fetch_plan_one(&input_rid, allow_non_deterministic, tasks, resources)
                    .await?;
            }
            tasks.insert(tid);
            resources.insert(rid.clone());
            Ok(())
        })
    }

    /// Runs a pipe body on stored arguments without recording anything.
    pub(super) async fn run_pipe_unrecorded(
        &self,
        pipe: &Pipe,
        args: &[ArgValue],
        kwargs: &BTreeMap<String, ArgValue>,
    ) -> Result<Value, RmsError> {
        let (resolved_args, resolved_kwargs) = self.resolve_all(args, kwargs).await?;
        pipe.func.call(&resolved_args, &resolved_kwargs)
    }

    /// Commits a finished execution: the task, its return resource, its
    /// output file records, and overwrite markers for files superseded
    /// at the same paths - all in one transaction.
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn register_finished_task(
        &self,
        pipe: &Pipe,
        args: Vec<ArgValue>,
        kwargs: BTreeMap<String, ArgValue>,
        resolved_args: &[RunValue],
        resolved_kwargs: &BTreeMap<String, RunValue>,
        value: Value,
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        annotations: &RunAnnotations,
        task_info: InfoMap,
    ) -> Result<Task, RmsError> {
        let declared = compute_output_paths(pipe, resolved_args, resolved_kwargs)?;
        let mut kept = Vec::new();
        for path in declared {
            if path.exists() {
                kept.push(path);
            } else {
                warn!(path = %path.display(), "declared output file was not produced; dropping");
            }
        }

        let tid = TaskId::new();
        let rid = ResourceId::new();
        let resource = Resource::new(
            rid.clone(),
            Some(tid.clone()),
            pipe.return_volatile,
            annotations.resource_description.clone(),
            annotations.resource_tags.clone(),
            annotations.resource_info.clone(),
            Some(value),
        );
        let files: Vec<FileResource> = kept
            .into_iter()
            .map(|path| FileResource {
                id: FileId::new(),
                task_id: Some(tid.clone()),
                md5: rms_domain::services::checksum::try_file_md5(&path),
                file_path: path,
                description: annotations.file_description.clone(),
                tags: annotations.file_tags.clone(),
                info: annotations.file_info.clone(),
            })
            .collect();
        let task = Task {
            id: tid,
            pipe_id: pipe.id.clone(),
            args,
            kwargs,
            return_values: vec![rid],
            output_files: files.iter().map(|f| f.id.clone()).collect(),
            begin_time,
            end_time,
            description: annotations.task_description.clone(),
            tags: annotations.task_tags.clone(),
            info: task_info,
        };

        // Files previously live at any of the same paths get marked
        // overwritten in the same transaction, deprecated or not.
        let mut overwritten: Vec<FileId> = Vec::new();
        for file in &files {
            let old_fids = self
                .catalog
                .query_strings(&Statement::new(
                    "SELECT fid FROM files WHERE file_path = ?",
                    vec![file.file_path.to_string_lossy().to_string().into()],
                ))
                .await?;
            for fid_str in old_fids {
                let fid = FileId::parse(&fid_str)?;
                let old = self.get_file_resource(&fid, false).await?;
                if !old.info.contains_key(info_keys::OVERWRITTEN) {
                    overwritten.push(fid);
                }
            }
        }

        let mut stmts = statements::insert_task(&task)?;
        stmts.extend(statements::insert_resource(&resource)?);
        for file in &files {
            stmts.extend(statements::insert_file(file)?);
        }
        let end_text = end_time.to_rfc3339();
        for fid in &overwritten {
            stmts.push(statements::info_marker(
                &FullId::FileResource(fid.clone()),
                info_keys::OVERWRITTEN,
                &end_text,
            )?);
        }
        self.catalog.execute_atomic(&stmts).await?;

        {
            let mut caches = self.caches.write();
            caches.resources.insert(resource.id.clone(), resource.clone());
            for file in &files {
                caches.files.insert(file.id.clone(), file.clone());
            }
            caches.tasks.insert(task.id.clone(), task.clone());
            for fid in &overwritten {
                if let Some(cached) = caches.files.get_mut(fid) {
                    cached
                        .info
                        .insert(info_keys::OVERWRITTEN.to_string(), end_text.clone());
                }
            }
        }

        let mut events = vec![RmsEvent::insert(task.full_id())];
        events.extend(files.iter().map(|f| RmsEvent::insert(f.full_id())));
        events.push(RmsEvent::insert(resource.full_id()));
        events.extend(
            overwritten
                .iter()
                .map(|fid| RmsEvent::modify(FullId::FileResource(fid.clone()))),
        );
        self.events.emit(events);

        info!(
            tid = %task.id,
            pipe = %pipe.func.qualified_name(),
            outputs = files.len(),
            "recorded finished task"
        );
        Ok(task)
    }
}

/// Evaluates the pipe's output function on resolved arguments and
/// absolutizes the declared paths.
fn compute_output_paths(
    pipe: &Pipe,
    resolved_args: &[RunValue],
    resolved_kwargs: &BTreeMap<String, RunValue>,
) -> Result<Vec<PathBuf>, RmsError> {
    let Some(output_func) = &pipe.output_func else {
        return Ok(Vec::new());
    };
    output_func
        .call(resolved_args, resolved_kwargs)?
        .into_iter()
        .map(|path| {
            std::path::absolute(&path)
                .map_err(|e| RmsError::io_error(format!("cannot absolutize {}: {}", path.display(), e)))
        })
        .collect()
}
