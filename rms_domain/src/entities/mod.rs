// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The six entry kinds of the catalog.

pub mod entry;
pub mod file_resource;
pub mod pipe;
pub mod resource;
pub mod task;
pub mod unrun_task;
pub mod virtual_resource;

pub use entry::{Entry, RmsEntry};
pub use file_resource::FileResource;
pub use pipe::Pipe;
pub use resource::Resource;
pub use task::Task;
pub use unrun_task::UnrunTask;
pub use virtual_resource::VirtualResource;
