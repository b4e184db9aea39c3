// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Descriptive metadata attached to catalog entries: free-form tags, a
//! string key/value info map, and the per-run annotation bundle.

use std::collections::{BTreeMap, BTreeSet};

/// Multi-valued free-form labels.
pub type Tags = BTreeSet<String>;

/// String key/value metadata. Reserved keys are listed in
/// [`info_keys`](super::info_keys).
pub type InfoMap = BTreeMap<String, String>;

/// Descriptions, tags and info for the three record kinds a run creates.
///
/// A single execution mints one task, one return resource, and zero or
/// more output file resources; each gets its own annotation set.
#[derive(Debug, Clone, Default)]
pub struct RunAnnotations {
    pub task_description: String,
    pub task_tags: Tags,
    pub task_info: InfoMap,
    pub resource_description: String,
    pub resource_tags: Tags,
    pub resource_info: InfoMap,
    pub file_description: String,
    pub file_tags: Tags,
    pub file_info: InfoMap,
}

impl RunAnnotations {
    pub fn with_task_description(mut self, description: impl Into<String>) -> Self {
        self.task_description = description.into();
        self
    }

    pub fn with_resource_description(mut self, description: impl Into<String>) -> Self {
        self.resource_description = description.into();
        self
    }

    pub fn with_file_description(mut self, description: impl Into<String>) -> Self {
        self.file_description = description.into();
        self
    }

    pub fn with_task_tag(mut self, tag: impl Into<String>) -> Self {
        self.task_tags.insert(tag.into());
        self
    }
}
