// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects of the RMS domain: identifiers, argument variants,
//! signatures and bindings, callable handles, and annotation bundles.

pub mod annotations;
pub mod arg_value;
pub mod binding;
pub mod entry_id;
pub mod full_id;
pub mod pipe_func;
pub mod run_value;
pub mod signature;

pub use annotations::{InfoMap, RunAnnotations, Tags};
pub use arg_value::{ArgValue, PlanArg};
pub use binding::{Binding, BoundValue};
pub use entry_id::{
    EntryId, FileId, PipeId, ResourceId, TaskId, UnrunTaskId, VirtualResourceId,
};
pub use full_id::{EntryKind, FullId};
pub use pipe_func::{FuncRecord, OutputBody, OutputFunc, PipeBody, PipeFunc};
pub use run_value::RunValue;
pub use signature::{Param, ParamKind, Signature};

/// Reserved info-map keys understood by the registry.
pub mod info_keys {
    /// Timestamp marker set when an entry is deprecated.
    pub const DEPRECATED: &str = "deprecated";
    /// Timestamp marker set when a file resource is superseded at its path.
    pub const OVERWRITTEN: &str = "overwritten";
    /// Marker that disqualifies an entry from being used as an input.
    pub const OBSOLETE: &str = "obsolete";
    /// Source text recorded for pipes registered with inline definitions.
    pub const SOURCECODE: &str = "sourcecode";
    /// Source text recorded for inline output-path functions.
    pub const OUTPUTFUNC_SOURCECODE: &str = "outputfunc_sourcecode";
    /// Identifier of the driving script, attached to every new task.
    pub const SCRIPT_ID: &str = "scriptid";
}
