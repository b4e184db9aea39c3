// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Argument Variants
//!
//! Task arguments mix plain scalar values with references to catalog
//! entries. [`ArgValue`] is the tagged variant that represents both, and
//! it determines which of the four per-kind argument tables a value is
//! persisted into.
//!
//! Scalars are compared and persisted by their canonical JSON encoding.
//! `serde_json` keeps object keys sorted, so the encoding is
//! deterministic: two scalars deduplicate against each other exactly when
//! their canonical strings match, which also settles the `1` vs `1.0`
//! question (different encodings, no dedup).
//!
//! [`PlanArg`] extends the variant with a reference to a virtual resource
//! and is the argument type of deferred plans.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entry_id::{FileId, PipeId, ResourceId, VirtualResourceId};
use super::full_id::FullId;

/// One task argument: a scalar JSON value or a typed entry reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgValue {
    /// A plain scalar, persisted as canonical JSON text.
    Json(Value),
    /// A reference to a resource; resolved to its content at run time.
    ResourceRef(ResourceId),
    /// A reference to a file resource; resolved to its absolute path.
    FileRef(FileId),
    /// A reference to a pipe; resolved to its callable.
    PipeRef(PipeId),
}

impl ArgValue {
    /// The canonical text encoding of a scalar value.
    ///
    /// This string is what the catalog stores and what deduplication
    /// compares, so it must be stable across processes.
    pub fn canonical_json(value: &Value) -> String {
        // serde_json object keys are BTreeMap-ordered, so this is
        // deterministic for any Value.
        value.to_string()
    }

    /// The full id of the referenced entry, if this is a reference.
    pub fn referenced_entry(&self) -> Option<FullId> {
        match self {
            ArgValue::Json(_) => None,
            ArgValue::ResourceRef(id) => Some(id.clone().into()),
            ArgValue::FileRef(id) => Some(id.clone().into()),
            ArgValue::PipeRef(id) => Some(id.clone().into()),
        }
    }

    pub fn is_reference(&self) -> bool {
        !matches!(self, ArgValue::Json(_))
    }
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        ArgValue::Json(value)
    }
}

impl From<ResourceId> for ArgValue {
    fn from(id: ResourceId) -> Self {
        ArgValue::ResourceRef(id)
    }
}

impl From<FileId> for ArgValue {
    fn from(id: FileId) -> Self {
        ArgValue::FileRef(id)
    }
}

impl From<PipeId> for ArgValue {
    fn from(id: PipeId) -> Self {
        ArgValue::PipeRef(id)
    }
}

/// One argument of a deferred plan: either a concrete value or a
/// placeholder for a resource that has not been produced yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanArg {
    Concrete(ArgValue),
    Virtual(VirtualResourceId),
}

impl PlanArg {
    /// The virtual resource this argument stands for, if any.
    pub fn virtual_ref(&self) -> Option<&VirtualResourceId> {
        match self {
            PlanArg::Virtual(id) => Some(id),
            PlanArg::Concrete(_) => None,
        }
    }

    /// The concrete value, failing for unresolved placeholders.
    pub fn as_concrete(&self) -> Option<&ArgValue> {
        match self {
            PlanArg::Concrete(v) => Some(v),
            PlanArg::Virtual(_) => None,
        }
    }
}

impl From<Value> for PlanArg {
    fn from(value: Value) -> Self {
        PlanArg::Concrete(ArgValue::Json(value))
    }
}

impl From<ArgValue> for PlanArg {
    fn from(value: ArgValue) -> Self {
        PlanArg::Concrete(value)
    }
}

impl From<VirtualResourceId> for PlanArg {
    fn from(id: VirtualResourceId) -> Self {
        PlanArg::Virtual(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_distinguishes_int_and_float() {
        assert_eq!(ArgValue::canonical_json(&json!(1)), "1");
        assert_eq!(ArgValue::canonical_json(&json!(1.0)), "1.0");
        assert_ne!(
            ArgValue::canonical_json(&json!(1)),
            ArgValue::canonical_json(&json!(1.0))
        );
    }

    #[test]
    fn test_canonical_json_sorts_object_keys() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": 2, "b": 1}"#).unwrap();
        assert_eq!(ArgValue::canonical_json(&a), ArgValue::canonical_json(&b));
    }

    #[test]
    fn test_referenced_entry() {
        let rid = ResourceId::new();
        let arg = ArgValue::ResourceRef(rid.clone());
        assert_eq!(arg.referenced_entry(), Some(rid.into()));
        assert_eq!(ArgValue::Json(json!(null)).referenced_entry(), None);
    }

    proptest! {
        /// Re-parsing a canonical encoding and re-encoding it is a fixed
        /// point, so stored scalars always compare equal to themselves.
        #[test]
        fn prop_canonical_encoding_is_stable(n in any::<i64>(), s in "[a-zA-Z0-9 ]{0,24}") {
            let value = json!({"n": n, "s": s, "nested": [n, s]});
            let encoded = ArgValue::canonical_json(&value);
            let reparsed: Value = serde_json::from_str(&encoded).unwrap();
            prop_assert_eq!(encoded, ArgValue::canonical_json(&reparsed));
        }
    }
}
