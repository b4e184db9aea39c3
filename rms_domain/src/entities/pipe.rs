// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipe Entity
//!
//! A pipe is a registered function together with its execution policy:
//! whether its return value is volatile (consumed on first read) and
//! whether it is deterministic (safe for lineage re-execution). Its
//! identity for deduplication is the tuple of module name, function name,
//! both flags, and the serialized identity records of the callable and
//! the optional output-path function.

use crate::value_objects::{
    EntryKind, FullId, InfoMap, OutputFunc, PipeFunc, PipeId, Signature, Tags,
};

use super::entry::RmsEntry;

/// A registered, content-addressed function handle.
#[derive(Debug, Clone)]
pub struct Pipe {
    pub id: PipeId,
    pub func: PipeFunc,
    /// When true, the return resource's in-memory content is consumed on
    /// first read.
    pub return_volatile: bool,
    /// When false, auto-fetch refuses to re-execute this pipe.
    pub is_deterministic: bool,
    /// Pure mapping from call arguments to the output file paths the
    /// pipe will write, evaluated before the body runs.
    pub output_func: Option<OutputFunc>,
    pub description: String,
    pub tags: Tags,
    pub info: InfoMap,
}

impl Pipe {
    pub fn signature(&self) -> &Signature {
        self.func.signature()
    }

    pub fn module_name(&self) -> &str {
        self.func.module_name()
    }

    pub fn func_name(&self) -> &str {
        self.func.func_name()
    }
}

impl RmsEntry for Pipe {
    fn kind(&self) -> EntryKind {
        EntryKind::Pipe
    }

    fn full_id(&self) -> FullId {
        FullId::Pipe(self.id.clone())
    }
}
