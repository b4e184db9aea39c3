// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Callable Handles and Identity Records
//!
//! A pipe is a registered function. Its catalog identity cannot depend on
//! a machine-code address, so every callable carries a [`FuncRecord`]: the
//! declaring module path, the symbol name, the declared signature,
//! optional normalized source text, and an optional version tag. The
//! record serializes to canonical JSON; the SHA-256 of those bytes is the
//! callable's fingerprint. Two registrations of the same definition
//! produce byte-identical records and therefore the same fingerprint,
//! which is what pipe deduplication compares.
//!
//! The callable itself is process-local and never serialized. A pipe
//! loaded from the catalog in a process that has not bound the function
//! is *unbound*: it still carries the full identity record (so searches,
//! bindings and dedup keep working), but invoking it fails with
//! `PipeUnbound` until a body is bound.
//!
//! Source text is normalized (dedented, trailing whitespace stripped) so
//! that two identical inline definitions hash identically regardless of
//! where they were written down.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::RmsError;

use super::run_value::RunValue;
use super::signature::Signature;

/// The body of a pipe: resolved arguments in, one JSON value out.
pub type PipeBody =
    Arc<dyn Fn(&[RunValue], &BTreeMap<String, RunValue>) -> Result<Value, RmsError> + Send + Sync>;

/// The body of an output-path function: resolved arguments in, the list
/// of file paths the pipe will produce out.
pub type OutputBody = Arc<
    dyn Fn(&[RunValue], &BTreeMap<String, RunValue>) -> Result<Vec<PathBuf>, RmsError>
        + Send
        + Sync,
>;

/// The serializable identity of a callable.
///
/// Field order is part of the canonical encoding; do not reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncRecord {
    pub module_name: String,
    pub func_name: String,
    pub signature: Signature,
    pub source: Option<String>,
    pub version_tag: Option<String>,
}

impl FuncRecord {
    /// Canonical JSON encoding of the record; the catalog column value.
    pub fn serialized(&self) -> Result<String, RmsError> {
        serde_json::to_string(self).map_err(RmsError::from)
    }

    /// SHA-256 hex digest of the canonical encoding.
    pub fn fingerprint(&self) -> Result<String, RmsError> {
        let bytes = self.serialized()?;
        let mut hasher = Sha256::new();
        hasher.update(bytes.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Strips location artifacts from source text so identical definitions
/// hash identically: common leading indentation is removed and trailing
/// whitespace is trimmed per line.
fn normalize_source(source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut out: Vec<String> = lines
        .iter()
        .map(|l| {
            if l.len() >= indent {
                l[indent..].trim_end().to_string()
            } else {
                l.trim_end().to_string()
            }
        })
        .collect();
    while out.first().is_some_and(|l| l.is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

/// A registered callable: identity record plus an optional process-local
/// body.
#[derive(Clone)]
pub struct PipeFunc {
    record: FuncRecord,
    body: Option<PipeBody>,
}

impl PipeFunc {
    /// Creates a bound callable handle.
    pub fn new(
        module_name: impl Into<String>,
        func_name: impl Into<String>,
        signature: Signature,
        body: PipeBody,
    ) -> Self {
        Self {
            record: FuncRecord {
                module_name: module_name.into(),
                func_name: func_name.into(),
                signature,
                source: None,
                version_tag: None,
            },
            body: Some(body),
        }
    }

    /// Recreates a handle from its catalog record, with no body bound.
    pub fn from_record(record: FuncRecord) -> Self {
        Self { record, body: None }
    }

    /// Attaches normalized source text to the identity record.
    pub fn with_source(mut self, source: &str) -> Self {
        self.record.source = Some(normalize_source(source));
        self
    }

    /// Attaches a version tag to the identity record.
    pub fn with_version_tag(mut self, tag: impl Into<String>) -> Self {
        self.record.version_tag = Some(tag.into());
        self
    }

    pub fn record(&self) -> &FuncRecord {
        &self.record
    }

    pub fn module_name(&self) -> &str {
        &self.record.module_name
    }

    pub fn func_name(&self) -> &str {
        &self.record.func_name
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.record.module_name, self.record.func_name)
    }

    pub fn signature(&self) -> &Signature {
        &self.record.signature
    }

    pub fn source(&self) -> Option<&str> {
        self.record.source.as_deref()
    }

    pub fn serialized(&self) -> Result<String, RmsError> {
        self.record.serialized()
    }

    pub fn fingerprint(&self) -> Result<String, RmsError> {
        self.record.fingerprint()
    }

    pub fn is_bound(&self) -> bool {
        self.body.is_some()
    }

    /// The process-local body, when bound.
    pub fn body(&self) -> Option<PipeBody> {
        self.body.clone()
    }

    /// Binds (or replaces) the process-local body.
    pub fn bind_body(&mut self, body: PipeBody) {
        self.body = Some(body);
    }

    /// Invokes the body on resolved arguments.
    ///
    /// # Errors
    /// `PipeUnbound` when no body is bound in this process; otherwise
    /// whatever the body returns.
    pub fn call(
        &self,
        args: &[RunValue],
        kwargs: &BTreeMap<String, RunValue>,
    ) -> Result<Value, RmsError> {
        match &self.body {
            Some(body) => body(args, kwargs),
            None => Err(RmsError::PipeUnbound(format!(
                "no callable bound for '{}' in this process",
                self.qualified_name()
            ))),
        }
    }
}

impl fmt::Debug for PipeFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeFunc")
            .field("module_name", &self.record.module_name)
            .field("func_name", &self.record.func_name)
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl PartialEq for PipeFunc {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

/// An output-path function: same identity shape as [`PipeFunc`], but the
/// body maps resolved arguments to the list of files the pipe writes.
#[derive(Clone)]
pub struct OutputFunc {
    record: FuncRecord,
    body: Option<OutputBody>,
}

impl OutputFunc {
    pub fn new(
        module_name: impl Into<String>,
        func_name: impl Into<String>,
        signature: Signature,
        body: OutputBody,
    ) -> Self {
        Self {
            record: FuncRecord {
                module_name: module_name.into(),
                func_name: func_name.into(),
                signature,
                source: None,
                version_tag: None,
            },
            body: Some(body),
        }
    }

    pub fn from_record(record: FuncRecord) -> Self {
        Self { record, body: None }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.record.source = Some(normalize_source(source));
        self
    }

    pub fn record(&self) -> &FuncRecord {
        &self.record
    }

    pub fn source(&self) -> Option<&str> {
        self.record.source.as_deref()
    }

    pub fn serialized(&self) -> Result<String, RmsError> {
        self.record.serialized()
    }

    pub fn is_bound(&self) -> bool {
        self.body.is_some()
    }

    pub fn body(&self) -> Option<OutputBody> {
        self.body.clone()
    }

    pub fn bind_body(&mut self, body: OutputBody) {
        self.body = Some(body);
    }

    pub fn call(
        &self,
        args: &[RunValue],
        kwargs: &BTreeMap<String, RunValue>,
    ) -> Result<Vec<PathBuf>, RmsError> {
        match &self.body {
            Some(body) => body(args, kwargs),
            None => Err(RmsError::PipeUnbound(format!(
                "no output function bound for '{}.{}' in this process",
                self.record.module_name, self.record.func_name
            ))),
        }
    }
}

impl fmt::Debug for OutputFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputFunc")
            .field("module_name", &self.record.module_name)
            .field("func_name", &self.record.func_name)
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl PartialEq for OutputFunc {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_func() -> PipeFunc {
        PipeFunc::new(
            "calc",
            "add",
            Signature::of_positional(["a", "b"]),
            Arc::new(|args: &[RunValue], _: &BTreeMap<String, RunValue>| {
                Ok(json!(args[0].as_i64()? + args[1].as_i64()?))
            }),
        )
    }

    #[test]
    fn test_call_bound_body() {
        let f = add_func();
        let args = vec![RunValue::Json(json!(2)), RunValue::Json(json!(3))];
        let out = f.call(&args, &BTreeMap::new()).unwrap();
        assert_eq!(out, json!(5));
    }

    #[test]
    fn test_unbound_call_fails() {
        let f = PipeFunc::from_record(add_func().record().clone());
        assert!(!f.is_bound());
        let err = f.call(&[], &BTreeMap::new());
        assert!(matches!(err, Err(RmsError::PipeUnbound(_))));
    }

    #[test]
    fn test_fingerprint_is_stable_across_instances() {
        let a = add_func();
        let b = add_func();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(a.serialized().unwrap(), b.serialized().unwrap());
    }

    #[test]
    fn test_fingerprint_changes_with_identity() {
        let a = add_func();
        let b = add_func().with_version_tag("v2");
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_source_normalization_ignores_indentation() {
        let a = add_func().with_source("    fn add(a, b):\n        a + b\n");
        let b = add_func().with_source("fn add(a, b):\n    a + b");
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(a.source().unwrap(), "fn add(a, b):\n    a + b");
    }

    #[test]
    fn test_record_round_trip() {
        let f = add_func().with_source("x");
        let text = f.serialized().unwrap();
        let record: FuncRecord = serde_json::from_str(&text).unwrap();
        let back = PipeFunc::from_record(record);
        assert_eq!(back, f);
    }
}
