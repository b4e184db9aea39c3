// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # RMS - Resource Management System
//!
//! The provenance kernel for computational pipelines. Every function
//! invocation is recorded as a task together with its inputs, outputs,
//! and produced artifacts in a durable catalog, so that identical
//! invocations are never re-executed, the lineage of every artifact is
//! queryable, and sub-pipelines can be re-materialized, deprecated, or
//! regenerated on demand.
//!
//! ## Components
//!
//! - [`Registry`](application::registry::Registry): the authoritative
//!   API - registration, lookup, mutation, deletion, lineage traversal,
//!   execution, deferred plans, and change events
//! - [`CatalogStore`](infrastructure::repositories::CatalogStore): the
//!   transactional SQLite store behind every mutation
//! - [`ContentStore`](infrastructure::repositories::ContentStore): the
//!   flat content-addressed payload directory
//! - [`TaskPool`](infrastructure::runtime::TaskPool): a bounded
//!   dependency-aware worker pool for running many jobs in parallel
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use rms::application::registry::{PipeOptions, Registry};
//! use rms::infrastructure::config::RmsConfig;
//! use rms_domain::value_objects::RunValue;
//! use rms_domain::{ArgValue, PipeFunc, RunAnnotations, Signature};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), rms_domain::RmsError> {
//! let registry = Registry::open(RmsConfig::default()).await?;
//!
//! let add = PipeFunc::new(
//!     "calc",
//!     "add",
//!     Signature::of_positional(["a", "b"]),
//!     Arc::new(|args: &[RunValue], _: &BTreeMap<String, RunValue>| {
//!         Ok(json!(args[0].as_i64()? + args[1].as_i64()?))
//!     }),
//! );
//! let pipe = registry.register_pipe(add, PipeOptions::default()).await?;
//!
//! let result = registry
//!     .run(
//!         &pipe.id,
//!         vec![ArgValue::Json(json!(2)), ArgValue::Json(json!(3))],
//!         Default::default(),
//!         RunAnnotations::default(),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod infrastructure;

pub use application::registry::{FileOptions, PipeOptions, Registry, Traversal};
pub use infrastructure::config::RmsConfig;
pub use infrastructure::runtime::TaskPool;
