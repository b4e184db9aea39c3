// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Declared Call Signatures
//!
//! A pipe declares the shape of its argument list as a [`Signature`]: an
//! ordered list of named parameters, each positional, keyword-only, or
//! variadic, optionally carrying a JSON default. Signatures travel inside
//! the pipe's identity record, so a pipe loaded from the catalog can
//! still bind arguments in a process that never saw the original
//! definition.
//!
//! Binding rules live in the sibling [`binding`](super::binding) module.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RmsError;

/// How a parameter accepts arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    /// Fillable positionally or by name.
    Positional,
    /// Collects surplus positional arguments.
    VarPositional,
    /// Fillable by name only.
    KeywordOnly,
    /// Collects surplus keyword arguments.
    VarKeyword,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    /// Default value, applied when the argument is not supplied.
    pub default: Option<Value>,
}

impl Param {
    pub fn positional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Positional,
            default: None,
        }
    }

    pub fn positional_with_default(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Positional,
            default: Some(default),
        }
    }

    pub fn keyword_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::KeywordOnly,
            default: None,
        }
    }

    pub fn keyword_only_with_default(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::KeywordOnly,
            default: Some(default),
        }
    }

    pub fn var_positional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::VarPositional,
            default: None,
        }
    }

    pub fn var_keyword(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::VarKeyword,
            default: None,
        }
    }
}

/// An ordered, validated parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    /// Validates and wraps a parameter list.
    ///
    /// # Errors
    /// Returns `RmsError::BindingError` when names repeat, more than one
    /// variadic parameter of a kind is declared, parameters appear out of
    /// order (positional, then `*args`, then keyword-only, then
    /// `**kwargs`), or a required positional parameter follows one with a
    /// default.
    pub fn new(params: Vec<Param>) -> Result<Self, RmsError> {
        let mut seen_names = std::collections::HashSet::new();
        for p in &params {
            if !seen_names.insert(p.name.as_str()) {
                return Err(RmsError::binding_error(format!(
                    "duplicate parameter name '{}'",
                    p.name
                )));
            }
        }

        // rank enforces declaration order
        let rank = |k: ParamKind| match k {
            ParamKind::Positional => 0,
            ParamKind::VarPositional => 1,
            ParamKind::KeywordOnly => 2,
            ParamKind::VarKeyword => 3,
        };
        let mut last_rank = 0;
        let mut var_pos = 0usize;
        let mut var_kw = 0usize;
        let mut saw_positional_default = false;
        for p in &params {
            let r = rank(p.kind);
            if r < last_rank {
                return Err(RmsError::binding_error(format!(
                    "parameter '{}' is declared out of order",
                    p.name
                )));
            }
            last_rank = r;
            match p.kind {
                ParamKind::VarPositional => var_pos += 1,
                ParamKind::VarKeyword => var_kw += 1,
                ParamKind::Positional => {
                    if p.default.is_some() {
                        saw_positional_default = true;
                    } else if saw_positional_default {
                        return Err(RmsError::binding_error(format!(
                            "required parameter '{}' follows a parameter with a default",
                            p.name
                        )));
                    }
                }
                ParamKind::KeywordOnly => {}
            }
        }
        if var_pos > 1 || var_kw > 1 {
            return Err(RmsError::binding_error(
                "at most one variadic parameter of each kind is allowed",
            ));
        }

        Ok(Self { params })
    }

    /// Convenience constructor for a plain positional signature.
    ///
    /// Names are taken as given; callers supply distinct names.
    pub fn of_positional<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            params: names.into_iter().map(Param::positional).collect(),
        }
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Index of the parameter with the given name.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Index of the `*args` parameter, if declared.
    pub fn var_positional_index(&self) -> Option<usize> {
        self.params.iter().position(|p| p.kind == ParamKind::VarPositional)
    }

    /// Index of the `**kwargs` parameter, if declared.
    pub fn var_keyword_index(&self) -> Option<usize> {
        self.params.iter().position(|p| p.kind == ParamKind::VarKeyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_signature() {
        let sig = Signature::new(vec![
            Param::positional("a"),
            Param::positional_with_default("b", json!(3)),
            Param::var_positional("rest"),
            Param::keyword_only("mode"),
            Param::var_keyword("extra"),
        ])
        .unwrap();
        assert_eq!(sig.len(), 5);
        assert_eq!(sig.var_positional_index(), Some(2));
        assert_eq!(sig.var_keyword_index(), Some(4));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Signature::new(vec![Param::positional("a"), Param::positional("a")]);
        assert!(matches!(err, Err(RmsError::BindingError(_))));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let err = Signature::new(vec![Param::keyword_only("k"), Param::positional("a")]);
        assert!(matches!(err, Err(RmsError::BindingError(_))));
    }

    #[test]
    fn test_required_after_default_rejected() {
        let err = Signature::new(vec![
            Param::positional_with_default("a", json!(1)),
            Param::positional("b"),
        ]);
        assert!(matches!(err, Err(RmsError::BindingError(_))));
    }

    #[test]
    fn test_serde_round_trip() {
        let sig = Signature::of_positional(["x", "y"]);
        let text = serde_json::to_string(&sig).unwrap();
        let back: Signature = serde_json::from_str(&text).unwrap();
        assert_eq!(sig, back);
    }
}
