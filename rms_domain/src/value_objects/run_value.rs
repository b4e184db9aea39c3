// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Runtime argument values handed to pipe bodies after resolution.
//!
//! The engine resolves each stored argument before execution: scalars
//! pass through, resource references materialize into their content,
//! file references become absolute paths, and pipe references become
//! callable handles.

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::RmsError;

use super::pipe_func::PipeFunc;

/// A resolved argument as seen by executing pipe code.
#[derive(Clone)]
pub enum RunValue {
    /// A plain scalar value.
    Json(Value),
    /// The absolute path of a registered file.
    Path(PathBuf),
    /// The callable handle of a registered pipe.
    Func(PipeFunc),
}

impl RunValue {
    pub fn json(&self) -> Result<&Value, RmsError> {
        match self {
            RunValue::Json(v) => Ok(v),
            other => Err(RmsError::invalid_input(format!(
                "expected a scalar argument, found {}",
                other.kind_name()
            ))),
        }
    }

    pub fn path(&self) -> Result<&Path, RmsError> {
        match self {
            RunValue::Path(p) => Ok(p),
            other => Err(RmsError::invalid_input(format!(
                "expected a file argument, found {}",
                other.kind_name()
            ))),
        }
    }

    pub fn func(&self) -> Result<&PipeFunc, RmsError> {
        match self {
            RunValue::Func(f) => Ok(f),
            other => Err(RmsError::invalid_input(format!(
                "expected a pipe argument, found {}",
                other.kind_name()
            ))),
        }
    }

    pub fn as_i64(&self) -> Result<i64, RmsError> {
        self.json()?
            .as_i64()
            .ok_or_else(|| RmsError::invalid_input("argument is not an integer"))
    }

    pub fn as_f64(&self) -> Result<f64, RmsError> {
        self.json()?
            .as_f64()
            .ok_or_else(|| RmsError::invalid_input("argument is not a number"))
    }

    pub fn as_str(&self) -> Result<&str, RmsError> {
        self.json()?
            .as_str()
            .ok_or_else(|| RmsError::invalid_input("argument is not a string"))
    }

    fn kind_name(&self) -> &'static str {
        match self {
            RunValue::Json(_) => "a scalar",
            RunValue::Path(_) => "a file path",
            RunValue::Func(_) => "a pipe",
        }
    }
}

impl fmt::Debug for RunValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunValue::Json(v) => write!(f, "Json({})", v),
            RunValue::Path(p) => write!(f, "Path({})", p.display()),
            RunValue::Func(func) => write!(f, "Func({})", func.qualified_name()),
        }
    }
}

impl From<Value> for RunValue {
    fn from(value: Value) -> Self {
        RunValue::Json(value)
    }
}
