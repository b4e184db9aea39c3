// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Catalog Entries
//!
//! [`RmsEntry`] is the identity contract every entity implements, and
//! [`Entry`] is the closed sum over the six concrete kinds. The registry
//! hands out `Entry` values from kind-agnostic lookups (`get`, lineage
//! traversal); typed accessors narrow back down to the concrete entity.

use crate::error::RmsError;
use crate::value_objects::{info_keys, EntryKind, FullId, InfoMap};

use super::file_resource::FileResource;
use super::pipe::Pipe;
use super::resource::Resource;
use super::task::Task;
use super::unrun_task::UnrunTask;
use super::virtual_resource::VirtualResource;

/// Identity contract shared by all catalog entries.
pub trait RmsEntry {
    fn kind(&self) -> EntryKind;
    fn full_id(&self) -> FullId;
}

/// Any catalog entry.
#[derive(Debug, Clone)]
pub enum Entry {
    Pipe(Pipe),
    Resource(Resource),
    FileResource(FileResource),
    Task(Task),
    UnrunTask(UnrunTask),
    VirtualResource(VirtualResource),
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Pipe(_) => EntryKind::Pipe,
            Entry::Resource(_) => EntryKind::Resource,
            Entry::FileResource(_) => EntryKind::FileResource,
            Entry::Task(_) => EntryKind::Task,
            Entry::UnrunTask(_) => EntryKind::UnrunTask,
            Entry::VirtualResource(_) => EntryKind::VirtualResource,
        }
    }

    pub fn full_id(&self) -> FullId {
        match self {
            Entry::Pipe(e) => e.full_id(),
            Entry::Resource(e) => e.full_id(),
            Entry::FileResource(e) => e.full_id(),
            Entry::Task(e) => e.full_id(),
            Entry::UnrunTask(e) => e.full_id(),
            Entry::VirtualResource(e) => e.full_id(),
        }
    }

    /// The info map, for the kinds that carry one.
    pub fn info(&self) -> Option<&InfoMap> {
        match self {
            Entry::Pipe(e) => Some(&e.info),
            Entry::Resource(e) => Some(&e.info),
            Entry::FileResource(e) => Some(&e.info),
            Entry::Task(e) => Some(&e.info),
            Entry::UnrunTask(_) | Entry::VirtualResource(_) => None,
        }
    }

    pub fn is_deprecated(&self) -> bool {
        self.info().is_some_and(|i| i.contains_key(info_keys::DEPRECATED))
    }

    pub fn is_overwritten(&self) -> bool {
        self.info().is_some_and(|i| i.contains_key(info_keys::OVERWRITTEN))
    }

    pub fn as_pipe(&self) -> Option<&Pipe> {
        match self {
            Entry::Pipe(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Entry::Resource(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_file_resource(&self) -> Option<&FileResource> {
        match self {
            Entry::FileResource(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_task(&self) -> Option<&Task> {
        match self {
            Entry::Task(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_unrun_task(&self) -> Option<&UnrunTask> {
        match self {
            Entry::UnrunTask(u) => Some(u),
            _ => None,
        }
    }

    pub fn into_task(self) -> Result<Task, RmsError> {
        match self {
            Entry::Task(t) => Ok(t),
            other => Err(RmsError::invalid_input(format!(
                "expected a task, found {}",
                other.kind()
            ))),
        }
    }

    pub fn into_resource(self) -> Result<Resource, RmsError> {
        match self {
            Entry::Resource(r) => Ok(r),
            other => Err(RmsError::invalid_input(format!(
                "expected a resource, found {}",
                other.kind()
            ))),
        }
    }
}

impl From<Pipe> for Entry {
    fn from(e: Pipe) -> Self {
        Entry::Pipe(e)
    }
}

impl From<Resource> for Entry {
    fn from(e: Resource) -> Self {
        Entry::Resource(e)
    }
}

impl From<FileResource> for Entry {
    fn from(e: FileResource) -> Self {
        Entry::FileResource(e)
    }
}

impl From<Task> for Entry {
    fn from(e: Task) -> Self {
        Entry::Task(e)
    }
}

impl From<UnrunTask> for Entry {
    fn from(e: UnrunTask) -> Self {
        Entry::UnrunTask(e)
    }
}

impl From<VirtualResource> for Entry {
    fn from(e: VirtualResource) -> Self {
        Entry::VirtualResource(e)
    }
}
