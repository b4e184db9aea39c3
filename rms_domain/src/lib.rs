// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # RMS Domain
//!
//! The domain layer of the RMS provenance kernel. It models the six entry
//! kinds of the catalog - pipes, tasks, resources, file resources, virtual
//! resources, and unrun tasks - together with the value objects they are
//! built from, and is completely independent of external concerns like the
//! database, the filesystem layout of the content store, or the async
//! runtime.
//!
//! ## Domain concepts
//!
//! ### Entities
//!
//! Entities have identity that persists through state changes:
//!
//! - [`Pipe`]: a registered, content-addressed function handle
//! - [`Task`]: the historical record of one pipe invocation
//! - [`Resource`]: a value produced by a task
//! - [`FileResource`]: an on-disk artifact tracked but not owned
//! - [`VirtualResource`] / [`UnrunTask`]: placeholders for a planned but
//!   not-yet-executed pipeline fragment
//!
//! ### Value objects
//!
//! Immutable, self-validating, defined by their attributes:
//!
//! - [`EntryId`](value_objects::EntryId): phantom-typed 128-bit hex
//!   identifiers, one category per entry kind
//! - [`FullId`]: the `(kind, id)` pair that names an entry everywhere
//! - [`ArgValue`]: the tagged argument variant - scalar JSON or an entity
//!   reference
//! - [`Signature`] / [`Binding`]: declared call signatures and the rules
//!   for binding positional and keyword arguments against them
//! - [`PipeFunc`](value_objects::PipeFunc): a callable handle with a
//!   canonical identity record and fingerprint
//!
//! ### Domain services
//!
//! Stateless operations that do not belong to a single entity, currently
//! the file checksum service used for [`FileResource`] records.
//!
//! ## Business rules
//!
//! The invariants enforced across this layer:
//!
//! - Every task owns exactly one return resource and zero or more output
//!   file resources, all stamped with the task's id.
//! - At most one live (not overwritten, not deprecated) file resource
//!   exists per absolute path.
//! - A volatile resource's in-memory content is consumed by its first
//!   read.
//! - A virtual resource is replaced at most once.

pub mod entities;
pub mod error;
pub mod events;
pub mod services;
pub mod value_objects;

// Re-export commonly used types for convenient access
// These exports provide a clean API surface for consumers of the domain layer
pub use entities::{Entry, FileResource, Pipe, Resource, RmsEntry, Task, UnrunTask, VirtualResource};
pub use error::RmsError;
pub use events::{EventKind, RmsEvent};
pub use value_objects::{
    ArgValue, Binding, BoundValue, EntryKind, FileId, FullId, InfoMap, OutputFunc, Param,
    ParamKind, PipeFunc, PipeId, PlanArg, ResourceId, RunAnnotations, RunValue, Signature, Tags,
    TaskId, UnrunTaskId, VirtualResourceId,
};
