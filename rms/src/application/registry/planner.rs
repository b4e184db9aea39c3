// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Deferred-Plan Planner
//!
//! Describes a pipeline in full before any execution: unrun tasks hold
//! partial bindings whose arguments may reference virtual resources, the
//! placeholders for outputs that do not exist yet. The graph of plans
//! can be inspected and traversed like recorded lineage, then
//! materialized task by task - each finished execution substitutes its
//! real outputs for the placeholders (by id, across single, variadic,
//! and keyword-map slots) and deletes the plan entries it realized.
//!
//! `create_unrun_task_chain` builds a structurally identical virtual
//! twin of an already-recorded sub-graph, in topological order so
//! substitution stays consistent.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use petgraph::algo::toposort;
use tracing::{debug, info, warn};

use rms_domain::value_objects::{PipeId, TaskId, UnrunTaskId, VirtualResourceId};
use rms_domain::{
    ArgValue, Binding, EntryKind, FullId, PlanArg, Resource, RmsEntry, RmsError, RmsEvent,
    RunAnnotations, UnrunTask, VirtualResource,
};

use super::{Registry, Traversal};

impl Registry {
    /// Mints a placeholder resource, in memory only.
    pub fn create_virtual_resource(&self) -> VirtualResource {
        let vr = VirtualResource::new(VirtualResourceId::new());
        self.caches
            .write()
            .virtual_resources
            .insert(vr.id.clone(), vr.clone());
        vr
    }

    /// Creates a planned task with a partial argument binding.
    ///
    /// `return_values` and `output_files` hold the placeholders the
    /// eventual execution will realize.
    pub async fn create_unrun_task(
        &self,
        pid: &PipeId,
        args: Vec<PlanArg>,
        kwargs: BTreeMap<String, PlanArg>,
        return_values: Vec<VirtualResourceId>,
        output_files: Vec<VirtualResourceId>,
        annotations: RunAnnotations,
    ) -> Result<UnrunTask, RmsError> {
        let pipe = self.get_pipe(pid, false).await?;
        let binding = Binding::bind_partial(pipe.signature(), args, kwargs)?;
        let unrun = UnrunTask {
            id: UnrunTaskId::new(),
            pipe_id: pid.clone(),
            binding,
            return_values,
            output_files,
            annotations,
            replacement: None,
        };
        self.caches
            .write()
            .unrun_tasks
            .insert(unrun.id.clone(), unrun.clone());
        Ok(unrun)
    }

    /// Creates a planned task mirroring a recorded one.
    pub async fn create_unrun_task_from_task(
        &self,
        tid: &TaskId,
        return_values: Vec<VirtualResourceId>,
        output_files: Vec<VirtualResourceId>,
    ) -> Result<UnrunTask, RmsError> {
        let task = self.get_task(tid, false).await?;
        let args = task.args.iter().cloned().map(PlanArg::Concrete).collect();
        let kwargs = task
            .kwargs
            .iter()
            .map(|(k, v)| (k.clone(), PlanArg::Concrete(v.clone())))
            .collect();
        self.create_unrun_task(
            &task.pipe_id,
            args,
            kwargs,
            return_values,
            output_files,
            RunAnnotations::default(),
        )
        .await
    }

    /// Builds a virtual twin of a recorded sub-graph.
    ///
    /// Every resource and file resource among the seeds becomes a fresh
    /// virtual resource; every task becomes an unrun task whose binding
    /// substitutes virtual for real. Returns the full ids of everything
    /// created, placeholders first.
    pub async fn create_unrun_task_chain(
        &self,
        seeds: &[FullId],
    ) -> Result<Vec<FullId>, RmsError> {
        let graph = self.lineage_graph(seeds).await?;
        let order = toposort(&graph, None).map_err(|_| {
            RmsError::invalid_input("lineage graph has a cycle; cannot build a plan")
        })?;

        let mut twins: HashMap<FullId, VirtualResourceId> = HashMap::new();
        let mut created: Vec<FullId> = Vec::new();

        for index in &order {
            let full_id = &graph[*index];
            if matches!(full_id.kind(), EntryKind::Resource | EntryKind::FileResource) {
                let vr = self.create_virtual_resource();
                twins.insert(full_id.clone(), vr.id.clone());
                created.push(vr.full_id());
            }
        }

        for index in &order {
            let full_id = &graph[*index];
            let FullId::Task(tid) = full_id else {
                continue;
            };
            let task = self.get_task(tid, false).await?;

            let mut return_values = Vec::with_capacity(task.return_values.len());
            for rid in &task.return_values {
                let key = FullId::Resource(rid.clone());
                match twins.get(&key) {
                    Some(vid) => return_values.push(vid.clone()),
                    None => {
                        let vr = self.create_virtual_resource();
                        created.push(vr.full_id());
                        return_values.push(vr.id);
                    }
                }
            }
            let mut output_files = Vec::with_capacity(task.output_files.len());
            for fid in &task.output_files {
                let key = FullId::FileResource(fid.clone());
                match twins.get(&key) {
                    Some(vid) => output_files.push(vid.clone()),
                    None => {
                        let vr = self.create_virtual_resource();
                        created.push(vr.full_id());
                        output_files.push(vr.id);
                    }
                }
            }

            let unrun = self
                .create_unrun_task_from_task(tid, return_values, output_files)
                .await?;

            // Rewrite the binding so arguments mirrored by placeholders
            // point at the placeholders.
            {
                let mut caches = self.caches.write();
                if let Some(cached) = caches.unrun_tasks.get_mut(&unrun.id) {
                    cached.binding.substitute_with(|arg| match arg {
                        PlanArg::Concrete(value) => value
                            .referenced_entry()
                            .and_then(|entry| twins.get(&entry))
                            .map(|vid| PlanArg::Virtual(vid.clone())),
                        PlanArg::Virtual(_) => None,
                    });
                }
            }
            created.push(unrun.full_id());
        }

        self.events
            .emit(created.iter().cloned().map(RmsEvent::insert).collect());
        info!(seeds = seeds.len(), created = created.len(), "built unrun task chain");
        Ok(created)
    }

    /// Substitutes a realized entry for a placeholder in every plan that
    /// consumes it, then deletes the placeholder.
    ///
    /// Substitution is by placeholder id, handling single, variadic, and
    /// keyword-map parameter slots separately.
    pub async fn replace_virtual_resource(
        &self,
        vid: &VirtualResourceId,
        replacement: &FullId,
    ) -> Result<(), RmsError> {
        let substitute = match replacement {
            FullId::Resource(rid) => ArgValue::ResourceRef(rid.clone()),
            FullId::FileResource(fid) => ArgValue::FileRef(fid.clone()),
            other => {
                return Err(RmsError::invalid_input(format!(
                    "a virtual resource can only be replaced by a resource or file, not {}",
                    other.kind()
                )));
            }
        };

        let full_id = FullId::VirtualResource(vid.clone());
        let consumers = self
            .find_downstream(std::slice::from_ref(&full_id), &Traversal::with_distance(1))
            .await?;

        {
            let mut caches = self.caches.write();
            if let Some(vr) = caches.virtual_resources.get_mut(vid) {
                vr.replacement = Some(replacement.clone());
            }
            for consumer in &consumers {
                let FullId::UnrunTask(uid) = consumer else {
                    continue;
                };
                if let Some(unrun) = caches.unrun_tasks.get_mut(uid) {
                    unrun.binding.substitute_with(|arg| match arg {
                        PlanArg::Virtual(v) if v == vid => {
                            Some(PlanArg::Concrete(substitute.clone()))
                        }
                        _ => None,
                    });
                }
            }
        }
        debug!(vid = %vid, replacement = %replacement, "replaced virtual resource");
        self.delete(std::slice::from_ref(&full_id)).await
    }

    /// Substitutes a finished task's outputs for a plan's placeholders,
    /// pairwise, then deletes the plan.
    ///
    /// A list whose length differs from the finished task's is skipped.
    pub async fn replace_unrun_task(
        &self,
        uid: &UnrunTaskId,
        tid: &TaskId,
    ) -> Result<(), RmsError> {
        let unrun = self.get_unrun_task(uid)?;
        let task = self.get_task(tid, false).await?;

        if unrun.return_values.len() == task.return_values.len() {
            for (vid, rid) in unrun.return_values.iter().zip(&task.return_values) {
                self.replace_virtual_resource(vid, &FullId::Resource(rid.clone()))
                    .await?;
            }
        }
        if unrun.output_files.len() == task.output_files.len() {
            for (vid, fid) in unrun.output_files.iter().zip(&task.output_files) {
                self.replace_virtual_resource(vid, &FullId::FileResource(fid.clone()))
                    .await?;
            }
        }

        {
            let mut caches = self.caches.write();
            if let Some(cached) = caches.unrun_tasks.get_mut(uid) {
                cached.replacement = Some(tid.clone());
            }
        }
        self.delete(std::slice::from_ref(&FullId::UnrunTask(uid.clone())))
            .await
    }

    /// Executes a ready plan: same dedup check as `run`, registration
    /// with the plan's annotations, then placeholder substitution.
    pub async fn run_unrun_task(&self, uid: &UnrunTaskId) -> Result<Resource, RmsError> {
        let unrun = self.get_unrun_task(uid)?;
        if !unrun.is_ready() {
            return Err(RmsError::binding_error(format!(
                "unrun task {uid} has an incomplete binding"
            )));
        }
        let unresolved = unrun.input_virtual_resources();
        if !unresolved.is_empty() {
            return Err(RmsError::resource_not_ready(format!(
                "unrun task {uid} still references {} virtual inputs",
                unresolved.len()
            )));
        }

        let pipe = self.get_pipe(&unrun.pipe_id, false).await?;
        let (plan_args, plan_kwargs) = unrun.binding.flatten();
        let args: Vec<ArgValue> = plan_args
            .into_iter()
            .filter_map(|a| a.as_concrete().cloned())
            .collect();
        let kwargs: BTreeMap<String, ArgValue> = plan_kwargs
            .into_iter()
            .filter_map(|(k, a)| a.as_concrete().cloned().map(|v| (k, v)))
            .collect();

        let previous = self
            .find_tasks_by_pipe_and_args(&unrun.pipe_id, &args, &kwargs, &[])
            .await?;
        let task = match previous.into_iter().next() {
            Some(task) => {
                info!(tid = %task.id, "plan already satisfied by a recorded task");
                task
            }
            None => {
                let (resolved_args, resolved_kwargs) = self.resolve_all(&args, &kwargs).await?;
                let begin_time = Utc::now();
                let value = pipe.func.call(&resolved_args, &resolved_kwargs)?;
                let end_time = Utc::now();
                self.register_finished_task(
                    &pipe,
                    args,
                    kwargs,
                    &resolved_args,
                    &resolved_kwargs,
                    value,
                    begin_time,
                    end_time,
                    &unrun.annotations,
                    unrun.annotations.task_info.clone(),
                )
                .await?
            }
        };

        self.replace_unrun_task(uid, &task.id).await?;
        let rid = task.return_values.first().ok_or_else(|| {
            RmsError::catalog_error(format!("task {} has no return resource", task.id))
        })?;
        self.get_resource(rid, false).await
    }

    /// Materializes a plan and, recursively, the plans producing its
    /// virtual inputs first.
    ///
    /// # Errors
    /// `ResourceNotReady` when a virtual input has no producing plan and
    /// therefore cannot be resolved.
    pub fn run_unrun_task_chain<'a>(
        &'a self,
        uid: &'a UnrunTaskId,
    ) -> Pin<Box<dyn Future<Output = Result<Resource, RmsError>> + Send + 'a>> {
        Box::pin(async move {
            let unrun = self.get_unrun_task(uid)?;
            for vid in unrun.input_virtual_resources() {
                let full_id = FullId::VirtualResource(vid.clone());
                let producers = self
                    .find_upstream(std::slice::from_ref(&full_id), &Traversal::with_distance(1))
                    .await?;
                let mut producer_uids: Vec<UnrunTaskId> = producers
                    .into_iter()
                    .filter_map(|p| match p {
                        FullId::UnrunTask(u) => Some(u),
                        _ => None,
                    })
                    .collect();
                if producer_uids.len() > 1 {
                    return Err(RmsError::catalog_error(format!(
                        "virtual resource {vid} has {} producing plans",
                        producer_uids.len()
                    )));
                }
                match producer_uids.pop() {
                    Some(producer) => {
                        self.run_unrun_task_chain(&producer).await?;
                    }
                    None => {
                        warn!(vid = %vid, "no plan produces this virtual resource");
                    }
                }
            }

            // Substitutions above rewrote our binding; re-read it.
            let unrun = self.get_unrun_task(uid)?;
            if !unrun.input_virtual_resources().is_empty() {
                return Err(RmsError::resource_not_ready(format!(
                    "unrun task {uid} still has unresolved virtual inputs"
                )));
            }
            self.run_unrun_task(uid).await
        })
    }

    /// Overwrites named argument slots of a plan.
    pub fn update_unrun_task_arguments(
        &self,
        uid: &UnrunTaskId,
        updates: BTreeMap<String, rms_domain::BoundValue<PlanArg>>,
    ) -> Result<(), RmsError> {
        {
            let mut caches = self.caches.write();
            let unrun = caches
                .unrun_tasks
                .get_mut(uid)
                .ok_or_else(|| RmsError::not_found(format!("no unrun task {uid}")))?;
            for (name, value) in updates {
                unrun.binding.set_argument(&name, value)?;
            }
        }
        self.events
            .emit(vec![RmsEvent::modify(FullId::UnrunTask(uid.clone()))]);
        Ok(())
    }
}
