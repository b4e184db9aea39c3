// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A file on disk registered with the catalog. The catalog records the
//! absolute path and a checksum but does not own the file.

use std::path::PathBuf;

use crate::value_objects::{EntryKind, FileId, FullId, InfoMap, Tags, TaskId};

use super::entry::RmsEntry;

/// An on-disk artifact tracked by the catalog.
#[derive(Debug, Clone)]
pub struct FileResource {
    pub id: FileId,
    /// The producing task; `None` for user-registered files.
    pub task_id: Option<TaskId>,
    /// Absolute path.
    pub file_path: PathBuf,
    /// MD5 recorded at registration time; `None` when the digest could
    /// not be computed.
    pub md5: Option<String>,
    pub description: String,
    pub tags: Tags,
    pub info: InfoMap,
}

impl RmsEntry for FileResource {
    fn kind(&self) -> EntryKind {
        EntryKind::FileResource
    }

    fn full_id(&self) -> FullId {
        FullId::FileResource(self.id.clone())
    }
}
