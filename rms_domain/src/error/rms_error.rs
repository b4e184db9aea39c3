// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the error system for the RMS provenance kernel.
//! Every fallible operation across the catalog, the registry, the
//! execution engine, the planner, and the task pool surfaces one of the
//! variants below.
//!
//! ## Error categories
//!
//! ### Catalog errors
//! - **CatalogError**: a transaction failed and was rolled back
//! - **NotFound**: an entry id does not resolve in the catalog
//!
//! ### Input errors
//! - **BindingError**: arguments do not match a pipe signature
//! - **InvalidInput**: an overwritten or obsolete entry was used as input
//! - **NotRegistered** / **Ambiguous**: path-to-file resolution failures
//!
//! ### Lifecycle errors
//! - **DependencyBreak**: a deletion would orphan dependent entries
//! - **ResourceNotReady**: consumed volatile content, or a virtual input
//!   that was never resolved
//! - **ContentMissing**: the content store lacks a payload and auto-fetch
//!   is disabled
//! - **NonDeterministic** / **WouldOverwriteFile**: auto-fetch refused to
//!   re-execute upstream tasks
//! - **PipeUnbound**: a pipe loaded from the catalog has no callable bound
//!   in this process
//!
//! ### Infrastructure errors
//! - **IoError**, **SerializationError**, **PoolError**
//!
//! ## Policy
//!
//! Errors from user pipe bodies are not wrapped or retried; they propagate
//! and no task is recorded. Catalog failures roll back the whole
//! transaction before surfacing.

use thiserror::Error;

/// Domain-specific errors for the RMS provenance kernel.
///
/// Each variant carries a descriptive message with enough context to act
/// on. Variants map one-to-one onto the failure policies of the registry
/// and engine, so callers can match on the kind rather than parse
/// messages.
#[derive(Error, Debug, Clone)]
pub enum RmsError {
    #[error("Catalog error: {0}")]
    CatalogError(String),

    #[error("Binding error: {0}")]
    BindingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not registered: {0}")]
    NotRegistered(String),

    #[error("Ambiguous: {0}")]
    Ambiguous(String),

    #[error("Dependency break: {0}")]
    DependencyBreak(String),

    #[error("Resource not ready: {0}")]
    ResourceNotReady(String),

    #[error("Content missing: {0}")]
    ContentMissing(String),

    #[error("Non-deterministic pipe: {0}")]
    NonDeterministic(String),

    #[error("Would overwrite file: {0}")]
    WouldOverwriteFile(String),

    #[error("Pipe unbound: {0}")]
    PipeUnbound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Pool error: {0}")]
    PoolError(String),
}

impl RmsError {
    /// Creates a new catalog error
    pub fn catalog_error(msg: impl Into<String>) -> Self {
        Self::CatalogError(msg.into())
    }

    /// Creates a new binding error
    pub fn binding_error(msg: impl Into<String>) -> Self {
        Self::BindingError(msg.into())
    }

    /// Creates a new invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a new resource-not-ready error
    pub fn resource_not_ready(msg: impl Into<String>) -> Self {
        Self::ResourceNotReady(msg.into())
    }

    /// Creates a new content-missing error
    pub fn content_missing(msg: impl Into<String>) -> Self {
        Self::ContentMissing(msg.into())
    }

    /// Creates a new IO error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::IoError(msg.into())
    }

    /// Creates a new serialization error
    pub fn serialization_error(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Creates a new pool error
    pub fn pool_error(msg: impl Into<String>) -> Self {
        Self::PoolError(msg.into())
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            RmsError::CatalogError(_) => "catalog",
            RmsError::BindingError(_) => "binding",
            RmsError::InvalidInput(_) => "input",
            RmsError::NotRegistered(_) => "lookup",
            RmsError::Ambiguous(_) => "lookup",
            RmsError::DependencyBreak(_) => "lifecycle",
            RmsError::ResourceNotReady(_) => "content",
            RmsError::ContentMissing(_) => "content",
            RmsError::NonDeterministic(_) => "refetch",
            RmsError::WouldOverwriteFile(_) => "refetch",
            RmsError::PipeUnbound(_) => "callable",
            RmsError::NotFound(_) => "lookup",
            RmsError::SerializationError(_) => "serialization",
            RmsError::IoError(_) => "io",
            RmsError::PoolError(_) => "pool",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for RmsError {
    fn from(err: std::io::Error) -> Self {
        RmsError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for RmsError {
    fn from(err: serde_json::Error) -> Self {
        RmsError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let err = RmsError::binding_error("missing required argument 'a'");
        assert_eq!(err.to_string(), "Binding error: missing required argument 'a'");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(RmsError::catalog_error("x").category(), "catalog");
        assert_eq!(RmsError::ContentMissing("x".into()).category(), "content");
        assert_eq!(RmsError::Ambiguous("x".into()).category(), "lookup");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RmsError = io.into();
        assert!(matches!(err, RmsError::IoError(_)));
    }
}
