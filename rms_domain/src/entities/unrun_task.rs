// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Unrun Task Entity
//!
//! A planned-but-unexecuted task: a pipe, a partial argument binding that
//! may reference virtual resources, and virtual placeholders for the
//! outputs the execution will produce. When the plan is materialized the
//! placeholders are substituted pairwise with the finished task's real
//! outputs and the unrun task is deleted.

use crate::value_objects::{
    ArgValue, Binding, EntryKind, FileId, FullId, PipeId, PlanArg, ResourceId, RunAnnotations,
    UnrunTaskId, VirtualResourceId,
};

use super::entry::RmsEntry;

/// A planned task whose arguments may still contain placeholders.
#[derive(Debug, Clone)]
pub struct UnrunTask {
    pub id: UnrunTaskId,
    pub pipe_id: PipeId,
    /// Partial binding against the pipe's signature.
    pub binding: Binding<PlanArg>,
    /// Placeholders for the return resources, in return order.
    pub return_values: Vec<VirtualResourceId>,
    /// Placeholders for the output files, in declaration order.
    pub output_files: Vec<VirtualResourceId>,
    /// Annotations applied to the records minted on materialization.
    pub annotations: RunAnnotations,
    /// The finished task that realized this plan, filled just before the
    /// unrun task is deleted.
    pub replacement: Option<crate::value_objects::TaskId>,
}

impl UnrunTask {
    /// True when the partial binding completes against the signature; a
    /// ready unrun task can be executed once its virtual inputs are
    /// resolved.
    pub fn is_ready(&self) -> bool {
        self.binding.is_complete()
    }

    fn concrete_args(&self) -> impl Iterator<Item = &ArgValue> {
        self.binding.values().filter_map(|a| a.as_concrete())
    }

    pub fn input_resources(&self) -> Vec<ResourceId> {
        self.concrete_args()
            .filter_map(|a| match a {
                ArgValue::ResourceRef(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn input_file_resources(&self) -> Vec<FileId> {
        self.concrete_args()
            .filter_map(|a| match a {
                ArgValue::FileRef(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn input_pipes(&self) -> Vec<PipeId> {
        self.concrete_args()
            .filter_map(|a| match a {
                ArgValue::PipeRef(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Placeholders still present among the arguments.
    pub fn input_virtual_resources(&self) -> Vec<VirtualResourceId> {
        self.binding
            .values()
            .filter_map(|a| a.virtual_ref().cloned())
            .collect()
    }

    /// Full ids of every argument reference, concrete and virtual.
    pub fn input_entries(&self) -> Vec<FullId> {
        self.binding
            .values()
            .filter_map(|a| match a {
                PlanArg::Concrete(v) => v.referenced_entry(),
                PlanArg::Virtual(id) => Some(FullId::VirtualResource(id.clone())),
            })
            .collect()
    }

    /// Full ids of the output placeholders.
    pub fn output_entries(&self) -> Vec<FullId> {
        self.return_values
            .iter()
            .chain(self.output_files.iter())
            .map(|vid| FullId::VirtualResource(vid.clone()))
            .collect()
    }

    /// True when the given placeholder is among this plan's outputs.
    pub fn produces(&self, vid: &VirtualResourceId) -> bool {
        self.return_values.contains(vid) || self.output_files.contains(vid)
    }

    /// True when the given placeholder is among this plan's arguments.
    pub fn consumes(&self, vid: &VirtualResourceId) -> bool {
        self.binding
            .values()
            .any(|a| a.virtual_ref() == Some(vid))
    }
}

impl RmsEntry for UnrunTask {
    fn kind(&self) -> EntryKind {
        EntryKind::UnrunTask
    }

    fn full_id(&self) -> FullId {
        FullId::UnrunTask(self.id.clone())
    }
}
