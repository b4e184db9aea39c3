// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The typed `(kind, id)` pair that names a catalog entry everywhere:
//! in events, in lineage traversal, and in deletion requests.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use super::entry_id::{FileId, PipeId, ResourceId, TaskId, UnrunTaskId, VirtualResourceId};

/// The six entry kinds of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryKind {
    Pipe,
    Resource,
    FileResource,
    Task,
    UnrunTask,
    VirtualResource,
}

impl EntryKind {
    /// Stable lowercase name, used in messages and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Pipe => "pipe",
            EntryKind::Resource => "resource",
            EntryKind::FileResource => "fileresource",
            EntryKind::Task => "task",
            EntryKind::UnrunTask => "unruntask",
            EntryKind::VirtualResource => "virtualresource",
        }
    }

    /// True for the kinds that live only in memory and never reach SQL.
    pub fn is_virtual(&self) -> bool {
        matches!(self, EntryKind::UnrunTask | EntryKind::VirtualResource)
    }
}

impl Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed full identifier: entry kind plus the id within that kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FullId {
    Pipe(PipeId),
    Resource(ResourceId),
    FileResource(FileId),
    Task(TaskId),
    UnrunTask(UnrunTaskId),
    VirtualResource(VirtualResourceId),
}

impl FullId {
    pub fn kind(&self) -> EntryKind {
        match self {
            FullId::Pipe(_) => EntryKind::Pipe,
            FullId::Resource(_) => EntryKind::Resource,
            FullId::FileResource(_) => EntryKind::FileResource,
            FullId::Task(_) => EntryKind::Task,
            FullId::UnrunTask(_) => EntryKind::UnrunTask,
            FullId::VirtualResource(_) => EntryKind::VirtualResource,
        }
    }

    /// The raw hex id, without the kind.
    pub fn id_str(&self) -> &str {
        match self {
            FullId::Pipe(id) => id.as_str(),
            FullId::Resource(id) => id.as_str(),
            FullId::FileResource(id) => id.as_str(),
            FullId::Task(id) => id.as_str(),
            FullId::UnrunTask(id) => id.as_str(),
            FullId::VirtualResource(id) => id.as_str(),
        }
    }
}

impl Display for FullId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id_str())
    }
}

impl From<PipeId> for FullId {
    fn from(id: PipeId) -> Self {
        FullId::Pipe(id)
    }
}

impl From<ResourceId> for FullId {
    fn from(id: ResourceId) -> Self {
        FullId::Resource(id)
    }
}

impl From<FileId> for FullId {
    fn from(id: FileId) -> Self {
        FullId::FileResource(id)
    }
}

impl From<TaskId> for FullId {
    fn from(id: TaskId) -> Self {
        FullId::Task(id)
    }
}

impl From<UnrunTaskId> for FullId {
    fn from(id: UnrunTaskId) -> Self {
        FullId::UnrunTask(id)
    }
}

impl From<VirtualResourceId> for FullId {
    fn from(id: VirtualResourceId) -> Self {
        FullId::VirtualResource(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_id_round_trip() {
        let tid = TaskId::new();
        let full: FullId = tid.clone().into();
        assert_eq!(full.kind(), EntryKind::Task);
        assert_eq!(full.id_str(), tid.as_str());
    }

    #[test]
    fn test_display_is_kind_prefixed() {
        let rid = ResourceId::new();
        let full: FullId = rid.clone().into();
        assert_eq!(full.to_string(), format!("resource:{}", rid.as_str()));
    }

    #[test]
    fn test_virtual_kinds() {
        assert!(EntryKind::UnrunTask.is_virtual());
        assert!(EntryKind::VirtualResource.is_virtual());
        assert!(!EntryKind::Pipe.is_virtual());
    }
}
