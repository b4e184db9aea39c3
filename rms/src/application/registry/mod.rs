// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Registry
//!
//! The authoritative API over the catalog: an in-memory write-through
//! cache per entry kind on top of the transactional store, plus the
//! execution engine, the lineage traversal, the deferred-plan planner,
//! and the change event bus.
//!
//! ## Caching
//!
//! Every persistent entry loaded from the catalog is cached. A cache hit
//! returns a clone; `refetch` reloads from the store and reconciles the
//! cached record in place, preserving process-local state the store does
//! not hold (in-memory resource content, bound pipe callables whose
//! identity record is unchanged).
//!
//! Unrun tasks and virtual resources live only in the cache; they never
//! reach SQL and disappear with the process.
//!
//! ## Transactions and events
//!
//! Every mutation assembles its full statement batch and commits it
//! through `CatalogStore::execute_atomic`. The corresponding event batch
//! is emitted after the commit, in commit order.

mod engine;
mod lineage;
mod planner;
mod search;

pub use lineage::Traversal;
pub use search::IoKind;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use crossbeam::channel::Receiver;
use parking_lot::{Mutex, RwLock};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, info};

use rms_domain::value_objects::{
    info_keys, FileId, FuncRecord, OutputFunc, PipeFunc, PipeId, ResourceId, TaskId, UnrunTaskId,
    VirtualResourceId,
};
use rms_domain::{
    ArgValue, Entry, EntryKind, FileResource, FullId, InfoMap, Pipe, Resource, RmsEntry, RmsError,
    RmsEvent, Tags, Task, UnrunTask, VirtualResource,
};

use crate::application::event_bus::EventBus;
use crate::infrastructure::config::RmsConfig;
use crate::infrastructure::repositories::{
    statements, CatalogStore, ContentStore, SqlValue, Statement,
};

/// Registration policy for a new pipe.
#[derive(Debug, Clone)]
pub struct PipeOptions {
    pub return_volatile: bool,
    /// When false, auto-fetch refuses to re-execute the pipe.
    pub is_deterministic: bool,
    pub output_func: Option<OutputFunc>,
    pub description: String,
    pub tags: Tags,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self {
            return_volatile: false,
            is_deterministic: true,
            output_func: None,
            description: String::new(),
            tags: Tags::new(),
        }
    }
}

/// Registration policy for a user-registered file.
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    pub description: String,
    pub tags: Tags,
    /// Register a new record even when a live one exists at the path,
    /// marking the old one overwritten.
    pub force: bool,
    /// The producing task, for files inserted on behalf of an execution.
    pub task_id: Option<TaskId>,
}

#[derive(Default)]
pub(crate) struct Caches {
    pub pipes: HashMap<PipeId, Pipe>,
    pub resources: HashMap<ResourceId, Resource>,
    pub files: HashMap<FileId, FileResource>,
    pub tasks: HashMap<TaskId, Task>,
    pub unrun_tasks: HashMap<UnrunTaskId, UnrunTask>,
    pub virtual_resources: HashMap<VirtualResourceId, VirtualResource>,
}

/// The in-memory authority over the catalog store.
pub struct Registry {
    pub(crate) catalog: CatalogStore,
    pub(crate) content: ContentStore,
    pub(crate) caches: RwLock<Caches>,
    pub(crate) events: EventBus,
    script_id: Mutex<Option<String>>,
}

impl Registry {
    /// Opens a registry over the configured catalog and content store.
    pub async fn open(config: RmsConfig) -> Result<Self, RmsError> {
        config.validate()?;
        let catalog = CatalogStore::open(&config.catalog_path).await?;
        let content = ContentStore::open(&config.content_dir).await?;
        info!(
            catalog = %config.catalog_path.display(),
            content = %config.content_dir.display(),
            "registry opened"
        );
        Ok(Self::with_stores(catalog, content))
    }

    /// Opens a registry over an in-memory catalog; content lives in the
    /// given directory. Useful for tests and scratch sessions.
    pub async fn in_memory(content_dir: &Path) -> Result<Self, RmsError> {
        let catalog = CatalogStore::in_memory().await?;
        let content = ContentStore::open(content_dir).await?;
        Ok(Self::with_stores(catalog, content))
    }

    /// Assembles a registry from already-opened stores.
    pub fn with_stores(catalog: CatalogStore, content: ContentStore) -> Self {
        Self {
            catalog,
            content,
            caches: RwLock::new(Caches::default()),
            events: EventBus::new(),
            script_id: Mutex::new(None),
        }
    }

    /// The stable identity of the backing catalog database.
    pub async fn database_id(&self) -> Result<String, RmsError> {
        self.catalog.database_id().await
    }

    /// Sets the script id attached to the info map of every new task.
    pub fn set_script_id(&self, script_id: Option<String>) {
        *self.script_id.lock() = script_id;
    }

    pub fn script_id(&self) -> Option<String> {
        self.script_id.lock().clone()
    }

    /// Registers a change subscriber; every committed mutation delivers
    /// one event batch to the returned channel.
    pub fn subscribe(&self) -> Receiver<Vec<RmsEvent>> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Registers a pipe, or returns the existing one with the same
    /// identity.
    ///
    /// Pipe identity is the tuple (module name, function name, both
    /// policy flags, serialized callable record, serialized output
    /// function record). When the match is an unbound cached pipe, the
    /// caller's body is bound onto it so the handle becomes invocable in
    /// this process.
    pub async fn register_pipe(
        &self,
        func: PipeFunc,
        options: PipeOptions,
    ) -> Result<Pipe, RmsError> {
        let serialized = func.serialized()?;
        let output_serialized = match &options.output_func {
            Some(f) => Some(f.serialized()?),
            None => None,
        };

        // Identity probe: same names and flags first, serialized records
        // second.
        let candidates = self
            .catalog
            .query_strings(&Statement::new(
                "SELECT pid FROM pipes WHERE return_volatile IS ? AND is_deterministic IS ? \
                 AND module_name IS ? AND func_name IS ?",
                vec![
                    options.return_volatile.into(),
                    options.is_deterministic.into(),
                    func.module_name().into(),
                    func.func_name().into(),
                ],
            ))
            .await?;
        for pid_str in candidates {
            let pid = PipeId::parse(&pid_str)?;
            let existing = self.get_pipe(&pid, false).await?;
            let existing_output = match &existing.output_func {
                Some(f) => Some(f.serialized()?),
                None => None,
            };
            if existing.func.serialized()? == serialized && existing_output == output_serialized {
                debug!(pid = %pid, "pipe already registered");
                return self.rebind_pipe(&pid, &func, options.output_func.as_ref());
            }
        }

        let mut info = InfoMap::new();
        if let Some(source) = func.source() {
            info.insert(info_keys::SOURCECODE.to_string(), source.to_string());
        }
        if let Some(source) = options.output_func.as_ref().and_then(|f| f.source()) {
            info.insert(info_keys::OUTPUTFUNC_SOURCECODE.to_string(), source.to_string());
        }

        let pipe = Pipe {
            id: PipeId::new(),
            func,
            return_volatile: options.return_volatile,
            is_deterministic: options.is_deterministic,
            output_func: options.output_func,
            description: options.description,
            tags: options.tags,
            info,
        };
        self.catalog
            .execute_atomic(&statements::insert_pipe(&pipe)?)
            .await?;
        self.caches.write().pipes.insert(pipe.id.clone(), pipe.clone());
        self.events.emit(vec![RmsEvent::insert(pipe.full_id())]);
        info!(pid = %pipe.id, name = %pipe.func.qualified_name(), "registered pipe");
        Ok(pipe)
    }

    /// Binds the caller's bodies onto a cached pipe and returns it.
    fn rebind_pipe(
        &self,
        pid: &PipeId,
        func: &PipeFunc,
        output_func: Option<&OutputFunc>,
    ) -> Result<Pipe, RmsError> {
        let mut caches = self.caches.write();
        let pipe = caches
            .pipes
            .get_mut(pid)
            .ok_or_else(|| RmsError::not_found(format!("pipe {pid} missing from cache")))?;
        if !pipe.func.is_bound() {
            if let Some(body) = func.body() {
                pipe.func.bind_body(body);
            }
        }
        if let (Some(existing), Some(incoming)) = (pipe.output_func.as_mut(), output_func) {
            if !existing.is_bound() {
                if let Some(body) = incoming.body() {
                    existing.bind_body(body);
                }
            }
        }
        Ok(pipe.clone())
    }

    /// Registers a file on disk, or returns the live record already
    /// covering its path.
    ///
    /// With `force`, a new record is inserted and any prior live record
    /// at the same absolute path is marked overwritten in the same
    /// transaction.
    pub async fn register_file(
        &self,
        path: &Path,
        options: FileOptions,
    ) -> Result<FileResource, RmsError> {
        let abs = std::path::absolute(path)
            .map_err(|e| RmsError::io_error(format!("cannot absolutize {}: {}", path.display(), e)))?;
        let existing = match self.file_from_path(&abs).await {
            Ok(f) => Some(f),
            Err(_) => None,
        };

        if let (Some(found), false) = (&existing, options.force) {
            return Ok(found.clone());
        }

        if !abs.exists() {
            return Err(RmsError::io_error(format!("{} does not exist", abs.display())));
        }
        let md5 = rms_domain::services::checksum::try_file_md5(&abs);
        let file = FileResource {
            id: FileId::new(),
            task_id: options.task_id,
            file_path: abs,
            md5,
            description: options.description,
            tags: options.tags,
            info: InfoMap::new(),
        };

        let mut stmts = statements::insert_file(&file)?;
        let mut events = Vec::new();
        if let Some(old) = &existing {
            let now = Utc::now().to_rfc3339();
            stmts.push(statements::info_marker(
                &old.full_id(),
                info_keys::OVERWRITTEN,
                &now,
            )?);
            events.push(RmsEvent::modify(old.full_id()));
        }
        self.catalog.execute_atomic(&stmts).await?;

        {
            let mut caches = self.caches.write();
            if let Some(old) = &existing {
                if let Some(cached) = caches.files.get_mut(&old.id) {
                    cached
                        .info
                        .insert(info_keys::OVERWRITTEN.to_string(), Utc::now().to_rfc3339());
                }
            }
            caches.files.insert(file.id.clone(), file.clone());
        }
        events.push(RmsEvent::insert(file.full_id()));
        self.events.emit(events);
        info!(fid = %file.id, path = %file.file_path.display(), "registered file");
        Ok(file)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// True when the full id resolves.
    pub async fn has(&self, full_id: &FullId) -> bool {
        self.get(full_id, false).await.is_ok()
    }

    /// Fetches any entry by its full id.
    ///
    /// Cache hit unless `refetch`; a refetch reloads from the store and
    /// reconciles the cached record in place.
    pub async fn get(&self, full_id: &FullId, refetch: bool) -> Result<Entry, RmsError> {
        match full_id {
            FullId::Pipe(id) => Ok(Entry::Pipe(self.get_pipe(id, refetch).await?)),
            FullId::Resource(id) => Ok(Entry::Resource(self.get_resource(id, refetch).await?)),
            FullId::FileResource(id) => {
                Ok(Entry::FileResource(self.get_file_resource(id, refetch).await?))
            }
            FullId::Task(id) => Ok(Entry::Task(self.get_task(id, refetch).await?)),
            FullId::UnrunTask(id) => Ok(Entry::UnrunTask(self.get_unrun_task(id)?)),
            FullId::VirtualResource(id) => {
                Ok(Entry::VirtualResource(self.get_virtual_resource(id)?))
            }
        }
    }

    pub async fn get_pipe(&self, pid: &PipeId, refetch: bool) -> Result<Pipe, RmsError> {
        if !refetch {
            if let Some(pipe) = self.caches.read().pipes.get(pid) {
                return Ok(pipe.clone());
            }
        }

        let rows = self
            .catalog
            .query(&Statement::new(
                "SELECT pid, func, return_volatile, is_deterministic, module_name, func_name, \
                 output_func, description FROM pipes WHERE pid = ?",
                vec![pid.as_str().into()],
            ))
            .await?;
        let row = single_row(rows, "pipe", pid.as_str())?;

        let func_text: String = col(&row, "func")?;
        let record: FuncRecord = serde_json::from_str(&func_text)?;
        let func = PipeFunc::from_record(record);
        let output_func = match col::<Option<String>>(&row, "output_func")? {
            Some(text) => {
                let record: FuncRecord = serde_json::from_str(&text)?;
                Some(OutputFunc::from_record(record))
            }
            None => None,
        };
        let return_volatile = col::<i64>(&row, "return_volatile")? != 0;
        let is_deterministic = col::<i64>(&row, "is_deterministic")? != 0;
        let description = col::<Option<String>>(&row, "description")?.unwrap_or_default();
        let tags = self.load_tags(EntryKind::Pipe, pid.as_str()).await?;
        let info = self.load_info(EntryKind::Pipe, pid.as_str()).await?;

        let mut caches = self.caches.write();
        let pipe = match caches.pipes.get_mut(pid) {
            Some(cached) => {
                // Keep a bound body when the identity record is unchanged.
                if cached.func.record() == func.record() && cached.func.is_bound() {
                    // body stays as-is
                } else {
                    cached.func = func;
                }
                match (&mut cached.output_func, output_func) {
                    (Some(old), Some(new)) if old.record() == new.record() && old.is_bound() => {}
                    (slot, new) => *slot = new,
                }
                cached.return_volatile = return_volatile;
                cached.is_deterministic = is_deterministic;
                cached.description = description;
                cached.tags = tags;
                cached.info = info;
                cached.clone()
            }
            None => {
                let pipe = Pipe {
                    id: pid.clone(),
                    func,
                    return_volatile,
                    is_deterministic,
                    output_func,
                    description,
                    tags,
                    info,
                };
                caches.pipes.insert(pid.clone(), pipe.clone());
                pipe
            }
        };
        Ok(pipe)
    }

    pub async fn get_resource(&self, rid: &ResourceId, refetch: bool) -> Result<Resource, RmsError> {
        if !refetch {
            if let Some(resource) = self.caches.read().resources.get(rid) {
                return Ok(resource.clone());
            }
        }

        let rows = self
            .catalog
            .query(&Statement::new(
                "SELECT rid, volatile, description FROM resources WHERE rid = ?",
                vec![rid.as_str().into()],
            ))
            .await?;
        let row = single_row(rows, "resource", rid.as_str())?;
        let volatile = col::<Option<i64>>(&row, "volatile")?.unwrap_or(0) != 0;
        let description = col::<Option<String>>(&row, "description")?.unwrap_or_default();

        let producer = self
            .catalog
            .query_strings(&Statement::new(
                "SELECT tid FROM tasks_returnvalue WHERE rid = ?",
                vec![rid.as_str().into()],
            ))
            .await?;
        if producer.len() > 1 {
            return Err(RmsError::catalog_error(format!(
                "resource {rid} has {} producing tasks",
                producer.len()
            )));
        }
        let task_id = match producer.first() {
            Some(tid) => Some(TaskId::parse(tid)?),
            None => None,
        };
        let tags = self.load_tags(EntryKind::Resource, rid.as_str()).await?;
        let info = self.load_info(EntryKind::Resource, rid.as_str()).await?;

        let mut caches = self.caches.write();
        let resource = match caches.resources.get_mut(rid) {
            Some(cached) => {
                // Content and its consumed state are process-local; the
                // reconcile touches metadata only.
                cached.task_id = task_id;
                cached.volatile = volatile;
                cached.description = description;
                cached.tags = tags;
                cached.info = info;
                cached.clone()
            }
            None => {
                let resource = Resource::new(
                    rid.clone(),
                    task_id,
                    volatile,
                    description,
                    tags,
                    info,
                    None,
                );
                caches.resources.insert(rid.clone(), resource.clone());
                resource
            }
        };
        Ok(resource)
    }

    pub async fn get_file_resource(
        &self,
        fid: &FileId,
        refetch: bool,
    ) -> Result<FileResource, RmsError> {
        if !refetch {
            if let Some(file) = self.caches.read().files.get(fid) {
                return Ok(file.clone());
            }
        }

        let rows = self
            .catalog
            .query(&Statement::new(
                "SELECT fid, file_path, md5, description FROM files WHERE fid = ?",
                vec![fid.as_str().into()],
            ))
            .await?;
        let row = single_row(rows, "file resource", fid.as_str())?;
        let file_path = PathBuf::from(col::<Option<String>>(&row, "file_path")?.unwrap_or_default());
        let md5 = col::<Option<String>>(&row, "md5")?;
        let description = col::<Option<String>>(&row, "description")?.unwrap_or_default();

        let producer = self
            .catalog
            .query_strings(&Statement::new(
                "SELECT tid FROM tasks_outputfiles WHERE fid = ?",
                vec![fid.as_str().into()],
            ))
            .await?;
        if producer.len() > 1 {
            return Err(RmsError::catalog_error(format!(
                "file resource {fid} has {} producing tasks",
                producer.len()
            )));
        }
        let task_id = match producer.first() {
            Some(tid) => Some(TaskId::parse(tid)?),
            None => None,
        };
        let tags = self.load_tags(EntryKind::FileResource, fid.as_str()).await?;
        let info = self.load_info(EntryKind::FileResource, fid.as_str()).await?;

        let mut caches = self.caches.write();
        let file = match caches.files.get_mut(fid) {
            Some(cached) => {
                cached.task_id = task_id;
                cached.file_path = file_path;
                cached.md5 = md5;
                cached.description = description;
                cached.tags = tags;
                cached.info = info;
                cached.clone()
            }
            None => {
                let file = FileResource {
                    id: fid.clone(),
                    task_id,
                    file_path,
                    md5,
                    description,
                    tags,
                    info,
                };
                caches.files.insert(fid.clone(), file.clone());
                file
            }
        };
        Ok(file)
    }

    pub async fn get_task(&self, tid: &TaskId, refetch: bool) -> Result<Task, RmsError> {
        if !refetch {
            if let Some(task) = self.caches.read().tasks.get(tid) {
                return Ok(task.clone());
            }
        }

        let rows = self
            .catalog
            .query(&Statement::new(
                "SELECT tid, pid, begin_time, end_time, description FROM tasks WHERE tid = ?",
                vec![tid.as_str().into()],
            ))
            .await?;
        let row = single_row(rows, "task", tid.as_str())?;
        let pipe_id = PipeId::parse(&col::<String>(&row, "pid")?)?;
        let begin_time = parse_time(&col::<String>(&row, "begin_time")?)?;
        let end_time = parse_time(&col::<String>(&row, "end_time")?)?;
        let description = col::<Option<String>>(&row, "description")?.unwrap_or_default();

        let args = self.load_task_args(tid).await?;
        let kwargs = self.load_task_kwargs(tid).await?;

        let return_values = self
            .catalog
            .query_strings(&Statement::new(
                "SELECT rid FROM tasks_returnvalue WHERE tid = ?",
                vec![tid.as_str().into()],
            ))
            .await?
            .iter()
            .map(|rid| ResourceId::parse(rid))
            .collect::<Result<Vec<_>, _>>()?;
        let output_files = self
            .catalog
            .query_strings(&Statement::new(
                "SELECT fid FROM tasks_outputfiles WHERE tid = ? ORDER BY forder ASC",
                vec![tid.as_str().into()],
            ))
            .await?
            .iter()
            .map(|fid| FileId::parse(fid))
            .collect::<Result<Vec<_>, _>>()?;

        let tags = self.load_tags(EntryKind::Task, tid.as_str()).await?;
        let info = self.load_info(EntryKind::Task, tid.as_str()).await?;

        let mut caches = self.caches.write();
        let task = match caches.tasks.get_mut(tid) {
            Some(cached) => {
                cached.pipe_id = pipe_id;
                cached.args = args;
                cached.kwargs = kwargs;
                cached.return_values = return_values;
                cached.output_files = output_files;
                cached.begin_time = begin_time;
                cached.end_time = end_time;
                cached.description = description;
                cached.tags = tags;
                cached.info = info;
                cached.clone()
            }
            None => {
                let task = Task {
                    id: tid.clone(),
                    pipe_id,
                    args,
                    kwargs,
                    return_values,
                    output_files,
                    begin_time,
                    end_time,
                    description,
                    tags,
                    info,
                };
                caches.tasks.insert(tid.clone(), task.clone());
                task
            }
        };
        Ok(task)
    }

    /// Unrun tasks live only in memory; there is nothing to refetch.
    pub fn get_unrun_task(&self, uid: &UnrunTaskId) -> Result<UnrunTask, RmsError> {
        self.caches
            .read()
            .unrun_tasks
            .get(uid)
            .cloned()
            .ok_or_else(|| RmsError::not_found(format!("no unrun task {uid}")))
    }

    /// Virtual resources live only in memory; there is nothing to refetch.
    pub fn get_virtual_resource(
        &self,
        vid: &VirtualResourceId,
    ) -> Result<VirtualResource, RmsError> {
        self.caches
            .read()
            .virtual_resources
            .get(vid)
            .cloned()
            .ok_or_else(|| RmsError::not_found(format!("no virtual resource {vid}")))
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Column-level update of one entry in one transaction.
    pub async fn update(
        &self,
        full_id: &FullId,
        fields: &[(&str, SqlValue)],
    ) -> Result<Entry, RmsError> {
        let stmt = statements::update_columns(full_id, fields)?;
        self.catalog.execute_atomic(std::slice::from_ref(&stmt)).await?;
        let entry = self.get(full_id, true).await?;
        self.events.emit(vec![RmsEvent::modify(full_id.clone())]);
        Ok(entry)
    }

    /// Marks an entry deprecated, and with `propagate` every entry
    /// reachable downstream of it, all in one transaction.
    ///
    /// Only tasks, resources, and file resources accept the marker.
    pub async fn mark_deprecated(&self, full_id: &FullId, propagate: bool) -> Result<(), RmsError> {
        let mut targets = vec![full_id.clone()];
        if propagate {
            let downstream = self
                .find_downstream(std::slice::from_ref(full_id), &Traversal::default())
                .await?;
            targets.extend(downstream);
        }

        let now = Utc::now().to_rfc3339();
        let mut stmts = Vec::new();
        for target in &targets {
            match target.kind() {
                EntryKind::Task | EntryKind::Resource | EntryKind::FileResource => {
                    stmts.push(statements::info_marker(target, info_keys::DEPRECATED, &now)?);
                }
                other => {
                    return Err(RmsError::invalid_input(format!(
                        "{} entries cannot be deprecated",
                        other
                    )));
                }
            }
        }
        self.catalog.execute_atomic(&stmts).await?;

        // Refetch reconciles the cached copies.
        let mut events = Vec::with_capacity(targets.len());
        for target in &targets {
            self.get(target, true).await?;
            events.push(RmsEvent::modify(target.clone()));
        }
        self.events.emit(events);
        Ok(())
    }

    /// Deletes entries, atomically.
    ///
    /// Fails with `DependencyBreak` (touching nothing) unless the
    /// dependent set of the request is contained in the request itself:
    /// deleting a task requires deleting its outputs, deleting a
    /// resource, file, or pipe requires deleting every task referencing
    /// it.
    pub async fn delete(&self, full_ids: &[FullId]) -> Result<(), RmsError> {
        use std::collections::HashSet;

        let (virtual_ids, persistent_ids): (Vec<FullId>, Vec<FullId>) = full_ids
            .iter()
            .cloned()
            .partition(|id| id.kind().is_virtual());

        let requested: HashSet<FullId> = persistent_ids.iter().cloned().collect();
        let mut dependents: HashSet<FullId> = HashSet::new();
        for full_id in &requested {
            dependents.extend(self.dependents_of(full_id).await?);
        }
        let breaking: Vec<&FullId> = dependents.difference(&requested).collect();
        if !breaking.is_empty() {
            let listing: Vec<String> = breaking.iter().map(|id| format!("- {id}")).collect();
            return Err(RmsError::DependencyBreak(format!(
                "deleting would break dependents:\n{}",
                listing.join("\n")
            )));
        }

        let mut stmts = Vec::new();
        for full_id in &persistent_ids {
            stmts.extend(statements::delete_entry(full_id)?);
        }
        self.catalog.execute_atomic(&stmts).await?;

        {
            let mut caches = self.caches.write();
            for full_id in full_ids {
                match full_id {
                    FullId::Pipe(id) => {
                        caches.pipes.remove(id);
                    }
                    FullId::Resource(id) => {
                        caches.resources.remove(id);
                    }
                    FullId::FileResource(id) => {
                        caches.files.remove(id);
                    }
                    FullId::Task(id) => {
                        caches.tasks.remove(id);
                    }
                    FullId::UnrunTask(id) => {
                        caches.unrun_tasks.remove(id);
                    }
                    FullId::VirtualResource(id) => {
                        caches.virtual_resources.remove(id);
                    }
                }
            }
        }

        let events = persistent_ids
            .iter()
            .chain(virtual_ids.iter())
            .map(|id| RmsEvent::delete(id.clone()))
            .collect();
        self.events.emit(events);
        debug!(count = full_ids.len(), "deleted entries");
        Ok(())
    }

    /// The entries whose existence depends on the given one.
    async fn dependents_of(&self, full_id: &FullId) -> Result<Vec<FullId>, RmsError> {
        match full_id {
            FullId::Resource(rid) => Ok(self
                .find_tasks_by_io(IoKind::Both, &[], std::slice::from_ref(rid), &[], None)
                .await?
                .into_iter()
                .map(|t| t.full_id())
                .collect()),
            FullId::FileResource(fid) => Ok(self
                .find_tasks_by_io(IoKind::Both, std::slice::from_ref(fid), &[], &[], None)
                .await?
                .into_iter()
                .map(|t| t.full_id())
                .collect()),
            FullId::Task(tid) => {
                let task = self.get_task(tid, false).await?;
                Ok(task.output_entries())
            }
            FullId::Pipe(pid) => Ok(self
                .find_tasks_by_pipe(std::slice::from_ref(pid))
                .await?
                .into_iter()
                .map(|t| t.full_id())
                .collect()),
            FullId::UnrunTask(_) | FullId::VirtualResource(_) => Ok(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Row decoding helpers
    // ------------------------------------------------------------------

    async fn load_tags(&self, kind: EntryKind, id: &str) -> Result<Tags, RmsError> {
        let (table, column) = sidecar(kind, "tags")?;
        let rows = self
            .catalog
            .query_strings(&Statement::new(
                format!("SELECT tag_value FROM {table} WHERE {column} = ?"),
                vec![id.into()],
            ))
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn load_info(&self, kind: EntryKind, id: &str) -> Result<InfoMap, RmsError> {
        let (table, column) = sidecar(kind, "info")?;
        let rows = self
            .catalog
            .query(&Statement::new(
                format!("SELECT info_key, info_value FROM {table} WHERE {column} = ?"),
                vec![id.into()],
            ))
            .await?;
        let mut info = InfoMap::new();
        for row in rows {
            let key: String = col(&row, "info_key")?;
            let value: String = col(&row, "info_value")?;
            info.insert(key, value);
        }
        Ok(info)
    }

    async fn load_task_args(&self, tid: &TaskId) -> Result<Vec<ArgValue>, RmsError> {
        let mut ordered: Vec<(i64, ArgValue)> = Vec::new();

        let rows = self
            .catalog
            .query(&Statement::new(
                "SELECT arg_order, arg_value FROM tasks_args_json WHERE tid = ?",
                vec![tid.as_str().into()],
            ))
            .await?;
        for row in rows {
            let value: serde_json::Value = serde_json::from_str(&col::<String>(&row, "arg_value")?)?;
            ordered.push((col(&row, "arg_order")?, ArgValue::Json(value)));
        }

        let rows = self
            .catalog
            .query(&Statement::new(
                "SELECT arg_order, rid FROM tasks_args_resource WHERE tid = ?",
                vec![tid.as_str().into()],
            ))
            .await?;
        for row in rows {
            let rid = ResourceId::parse(&col::<String>(&row, "rid")?)?;
            ordered.push((col(&row, "arg_order")?, ArgValue::ResourceRef(rid)));
        }

        let rows = self
            .catalog
            .query(&Statement::new(
                "SELECT arg_order, fid FROM tasks_args_file WHERE tid = ?",
                vec![tid.as_str().into()],
            ))
            .await?;
        for row in rows {
            let fid = FileId::parse(&col::<String>(&row, "fid")?)?;
            ordered.push((col(&row, "arg_order")?, ArgValue::FileRef(fid)));
        }

        let rows = self
            .catalog
            .query(&Statement::new(
                "SELECT arg_order, pid FROM tasks_args_pipe WHERE tid = ?",
                vec![tid.as_str().into()],
            ))
            .await?;
        for row in rows {
            let pid = PipeId::parse(&col::<String>(&row, "pid")?)?;
            ordered.push((col(&row, "arg_order")?, ArgValue::PipeRef(pid)));
        }

        ordered.sort_by_key(|(order, _)| *order);
        Ok(ordered.into_iter().map(|(_, arg)| arg).collect())
    }

    async fn load_task_kwargs(
        &self,
        tid: &TaskId,
    ) -> Result<std::collections::BTreeMap<String, ArgValue>, RmsError> {
        let mut kwargs = std::collections::BTreeMap::new();

        let rows = self
            .catalog
            .query(&Statement::new(
                "SELECT arg_key, arg_value FROM tasks_kwargs_json WHERE tid = ?",
                vec![tid.as_str().into()],
            ))
            .await?;
        for row in rows {
            let value: serde_json::Value = serde_json::from_str(&col::<String>(&row, "arg_value")?)?;
            kwargs.insert(col(&row, "arg_key")?, ArgValue::Json(value));
        }

        let rows = self
            .catalog
            .query(&Statement::new(
                "SELECT arg_key, rid FROM tasks_kwargs_resource WHERE tid = ?",
                vec![tid.as_str().into()],
            ))
            .await?;
        for row in rows {
            let rid = ResourceId::parse(&col::<String>(&row, "rid")?)?;
            kwargs.insert(col(&row, "arg_key")?, ArgValue::ResourceRef(rid));
        }

        let rows = self
            .catalog
            .query(&Statement::new(
                "SELECT arg_key, fid FROM tasks_kwargs_file WHERE tid = ?",
                vec![tid.as_str().into()],
            ))
            .await?;
        for row in rows {
            let fid = FileId::parse(&col::<String>(&row, "fid")?)?;
            kwargs.insert(col(&row, "arg_key")?, ArgValue::FileRef(fid));
        }

        let rows = self
            .catalog
            .query(&Statement::new(
                "SELECT arg_key, pid FROM tasks_kwargs_pipe WHERE tid = ?",
                vec![tid.as_str().into()],
            ))
            .await?;
        for row in rows {
            let pid = PipeId::parse(&col::<String>(&row, "pid")?)?;
            kwargs.insert(col(&row, "arg_key")?, ArgValue::PipeRef(pid));
        }

        Ok(kwargs)
    }
}

fn sidecar(kind: EntryKind, suffix: &str) -> Result<(String, &'static str), RmsError> {
    let (prefix, column) = match kind {
        EntryKind::Pipe => ("pipe", "pid"),
        EntryKind::Resource => ("resource", "rid"),
        EntryKind::FileResource => ("file", "fid"),
        EntryKind::Task => ("task", "tid"),
        other => {
            return Err(RmsError::invalid_input(format!(
                "{} entries have no sidecar tables",
                other
            )))
        }
    };
    Ok((format!("{prefix}_{suffix}"), column))
}

fn single_row(rows: Vec<SqliteRow>, kind: &str, id: &str) -> Result<SqliteRow, RmsError> {
    let mut rows = rows;
    match rows.len() {
        1 => Ok(rows.remove(0)),
        0 => Err(RmsError::not_found(format!("no {kind} with id {id}"))),
        n => Err(RmsError::catalog_error(format!(
            "{n} rows for {kind} id {id}"
        ))),
    }
}

fn col<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RmsError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get::<T, _>(name)
        .map_err(|e| RmsError::catalog_error(format!("column '{name}': {e}")))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, RmsError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RmsError::serialization_error(format!("bad timestamp {s:?}: {e}")))
}
