// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Entity
//!
//! A task is the historical record of one completed pipe invocation: the
//! pipe, the concrete arguments (scalar values and entry references), the
//! produced return resource and output files, and the execution window.
//! The argument lists are the post-default, flattened form of the call
//! binding, which is exactly what deduplication compares.

use chrono::{DateTime, Utc};

use crate::value_objects::{
    ArgValue, EntryKind, FileId, FullId, InfoMap, PipeId, ResourceId, Tags, TaskId,
};

use std::collections::BTreeMap;

use super::entry::RmsEntry;

/// A completed execution of a pipe.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub pipe_id: PipeId,
    /// Positional arguments in call order, defaults applied.
    pub args: Vec<ArgValue>,
    /// Keyword arguments, defaults applied.
    pub kwargs: BTreeMap<String, ArgValue>,
    /// The resources this task returned (exactly one is produced by the
    /// engine).
    pub return_values: Vec<ResourceId>,
    /// The output files this task wrote, in declaration order.
    pub output_files: Vec<FileId>,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub description: String,
    pub tags: Tags,
    pub info: InfoMap,
}

impl Task {
    fn arg_values(&self) -> impl Iterator<Item = &ArgValue> {
        self.args.iter().chain(self.kwargs.values())
    }

    /// Resources consumed as inputs.
    pub fn input_resources(&self) -> Vec<ResourceId> {
        self.arg_values()
            .filter_map(|a| match a {
                ArgValue::ResourceRef(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// File resources consumed as inputs.
    pub fn input_file_resources(&self) -> Vec<FileId> {
        self.arg_values()
            .filter_map(|a| match a {
                ArgValue::FileRef(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Pipes passed as arguments.
    pub fn input_pipes(&self) -> Vec<PipeId> {
        self.arg_values()
            .filter_map(|a| match a {
                ArgValue::PipeRef(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Full ids of all argument references, in argument order.
    pub fn input_entries(&self) -> Vec<FullId> {
        self.arg_values().filter_map(|a| a.referenced_entry()).collect()
    }

    /// Full ids of everything this task produced.
    pub fn output_entries(&self) -> Vec<FullId> {
        self.return_values
            .iter()
            .map(|rid| FullId::Resource(rid.clone()))
            .chain(self.output_files.iter().map(|fid| FullId::FileResource(fid.clone())))
            .collect()
    }

    /// Wall-clock execution time.
    pub fn run_time(&self) -> chrono::Duration {
        self.end_time - self.begin_time
    }
}

impl RmsEntry for Task {
    fn kind(&self) -> EntryKind {
        EntryKind::Task
    }

    fn full_id(&self) -> FullId {
        FullId::Task(self.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_accessors_split_by_kind() {
        let rid = ResourceId::new();
        let fid = FileId::new();
        let pid = PipeId::new();
        let mut kwargs = BTreeMap::new();
        kwargs.insert("f".to_string(), ArgValue::FileRef(fid.clone()));
        let task = Task {
            id: TaskId::new(),
            pipe_id: PipeId::new(),
            args: vec![
                ArgValue::Json(json!(1)),
                ArgValue::ResourceRef(rid.clone()),
                ArgValue::PipeRef(pid.clone()),
            ],
            kwargs,
            return_values: vec![ResourceId::new()],
            output_files: vec![],
            begin_time: Utc::now(),
            end_time: Utc::now(),
            description: String::new(),
            tags: Tags::new(),
            info: InfoMap::new(),
        };
        assert_eq!(task.input_resources(), vec![rid]);
        assert_eq!(task.input_file_resources(), vec![fid]);
        assert_eq!(task.input_pipes(), vec![pid]);
        assert_eq!(task.input_entries().len(), 3);
    }
}
