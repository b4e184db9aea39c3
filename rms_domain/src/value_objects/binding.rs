// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Argument Binding
//!
//! [`Binding`] resolves a positional argument list and a keyword argument
//! map against a declared [`Signature`], producing one slot per declared
//! parameter. Variadic parameters get aggregate slots (`VarList`,
//! `VarMap`). Defaults are applied eagerly, mirroring call semantics:
//! two invocations that differ only in whether a default was written out
//! explicitly bind to the same slots, and therefore deduplicate against
//! each other.
//!
//! A *partial* binding tolerates unbound required parameters; it is the
//! representation used by unrun tasks, whose arguments are completed by
//! placeholder substitution before execution.
//!
//! The slot structure (rather than a flat argument list) is what makes
//! in-place substitution possible: the planner rewrites single, variadic
//! and keyword-map slots separately when a virtual resource is realized.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RmsError;

use super::signature::{ParamKind, Signature};

/// The bound value of one parameter slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundValue<A> {
    /// An ordinary parameter bound to one value.
    Single(A),
    /// A `*args` parameter bound to the surplus positional arguments.
    VarList(Vec<A>),
    /// A `**kwargs` parameter bound to the surplus keyword arguments.
    VarMap(BTreeMap<String, A>),
}

/// Arguments bound against a signature, one slot per declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding<A> {
    signature: Signature,
    slots: Vec<Option<BoundValue<A>>>,
}

impl<A> Binding<A>
where
    A: Clone + From<Value>,
{
    /// Binds arguments fully; every required parameter must be satisfied.
    pub fn bind(
        signature: &Signature,
        args: Vec<A>,
        kwargs: BTreeMap<String, A>,
    ) -> Result<Self, RmsError> {
        Self::bind_inner(signature, args, kwargs, false)
    }

    /// Binds arguments partially; required parameters may stay unbound.
    pub fn bind_partial(
        signature: &Signature,
        args: Vec<A>,
        kwargs: BTreeMap<String, A>,
    ) -> Result<Self, RmsError> {
        Self::bind_inner(signature, args, kwargs, true)
    }

    fn bind_inner(
        signature: &Signature,
        args: Vec<A>,
        kwargs: BTreeMap<String, A>,
        partial: bool,
    ) -> Result<Self, RmsError> {
        let params = signature.params();
        let mut slots: Vec<Option<BoundValue<A>>> = vec![None; params.len()];

        // Positional arguments fill positional parameters in declaration
        // order; the surplus lands in *args when declared.
        let mut remaining: VecDeque<A> = args.into();
        for (i, p) in params.iter().enumerate() {
            match p.kind {
                ParamKind::Positional => {
                    if let Some(v) = remaining.pop_front() {
                        slots[i] = Some(BoundValue::Single(v));
                    }
                }
                ParamKind::VarPositional => {
                    slots[i] = Some(BoundValue::VarList(remaining.drain(..).collect()));
                }
                ParamKind::KeywordOnly | ParamKind::VarKeyword => {}
            }
        }
        if !remaining.is_empty() {
            return Err(RmsError::binding_error(format!(
                "too many positional arguments: {} left over",
                remaining.len()
            )));
        }

        // Keyword arguments match named parameters; the surplus lands in
        // **kwargs when declared.
        for (key, value) in kwargs {
            let named = signature.position_of(&key).filter(|&i| {
                matches!(params[i].kind, ParamKind::Positional | ParamKind::KeywordOnly)
            });
            match named {
                Some(i) => {
                    if slots[i].is_some() {
                        return Err(RmsError::binding_error(format!(
                            "multiple values for argument '{}'",
                            key
                        )));
                    }
                    slots[i] = Some(BoundValue::Single(value));
                }
                None => match signature.var_keyword_index() {
                    Some(vk) => {
                        let entry = slots[vk]
                            .get_or_insert_with(|| BoundValue::VarMap(BTreeMap::new()));
                        if let BoundValue::VarMap(map) = entry {
                            map.insert(key, value);
                        }
                    }
                    None => {
                        return Err(RmsError::binding_error(format!(
                            "unexpected keyword argument '{}'",
                            key
                        )));
                    }
                },
            }
        }

        // Defaults are applied even for partial bindings, so dedup sees
        // the same slots whether a default was spelled out or not.
        for (i, p) in params.iter().enumerate() {
            if slots[i].is_some() {
                continue;
            }
            match p.kind {
                ParamKind::Positional | ParamKind::KeywordOnly => {
                    if let Some(default) = &p.default {
                        slots[i] = Some(BoundValue::Single(A::from(default.clone())));
                    }
                }
                ParamKind::VarPositional => slots[i] = Some(BoundValue::VarList(Vec::new())),
                ParamKind::VarKeyword => slots[i] = Some(BoundValue::VarMap(BTreeMap::new())),
            }
        }

        if !partial {
            for (i, p) in params.iter().enumerate() {
                if slots[i].is_none() {
                    return Err(RmsError::binding_error(format!(
                        "missing required argument '{}'",
                        p.name
                    )));
                }
            }
        }

        Ok(Self {
            signature: signature.clone(),
            slots,
        })
    }
}

impl<A: Clone> Binding<A> {
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn slots(&self) -> &[Option<BoundValue<A>>] {
        &self.slots
    }

    /// True when every declared parameter has a bound value.
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|s| s.is_some())
    }

    /// Iterates over every bound value, including variadic members.
    pub fn values(&self) -> impl Iterator<Item = &A> {
        self.slots.iter().flatten().flat_map(|slot| {
            let iter: Box<dyn Iterator<Item = &A>> = match slot {
                BoundValue::Single(v) => Box::new(std::iter::once(v)),
                BoundValue::VarList(vs) => Box::new(vs.iter()),
                BoundValue::VarMap(map) => Box::new(map.values()),
            };
            iter
        })
    }

    /// Rewrites every bound value in place.
    ///
    /// The callback returns `Some(replacement)` for values to substitute
    /// and `None` for values to leave untouched. Single, variadic-list
    /// and keyword-map slots are each rewritten member-wise.
    pub fn substitute_with(&mut self, replace: impl Fn(&A) -> Option<A>) {
        for slot in self.slots.iter_mut().flatten() {
            match slot {
                BoundValue::Single(v) => {
                    if let Some(r) = replace(v) {
                        *v = r;
                    }
                }
                BoundValue::VarList(vs) => {
                    for v in vs.iter_mut() {
                        if let Some(r) = replace(v) {
                            *v = r;
                        }
                    }
                }
                BoundValue::VarMap(map) => {
                    for v in map.values_mut() {
                        if let Some(r) = replace(v) {
                            *v = r;
                        }
                    }
                }
            }
        }
    }

    /// Sets the slot of a named parameter directly.
    pub fn set_argument(&mut self, name: &str, value: BoundValue<A>) -> Result<(), RmsError> {
        let i = self
            .signature
            .position_of(name)
            .ok_or_else(|| RmsError::binding_error(format!("unknown parameter '{}'", name)))?;
        self.slots[i] = Some(value);
        Ok(())
    }

    /// Flattens the slots back into a positional list and a keyword map.
    ///
    /// Positional parameters contribute to the list while they are bound
    /// consecutively from the front; after the first gap, later bound
    /// positional parameters are emitted by name instead. Keyword-only
    /// parameters and `**kwargs` members are always emitted by name.
    pub fn flatten(&self) -> (Vec<A>, BTreeMap<String, A>) {
        let mut args = Vec::new();
        let mut kwargs = BTreeMap::new();
        let mut gap = false;
        for (p, slot) in self.signature.params().iter().zip(&self.slots) {
            match (p.kind, slot) {
                (ParamKind::Positional, Some(BoundValue::Single(v))) => {
                    if gap {
                        kwargs.insert(p.name.clone(), v.clone());
                    } else {
                        args.push(v.clone());
                    }
                }
                (ParamKind::Positional, None) => gap = true,
                (ParamKind::VarPositional, Some(BoundValue::VarList(vs))) => {
                    if !gap {
                        args.extend(vs.iter().cloned());
                    }
                }
                (ParamKind::KeywordOnly, Some(BoundValue::Single(v))) => {
                    kwargs.insert(p.name.clone(), v.clone());
                }
                (ParamKind::VarKeyword, Some(BoundValue::VarMap(map))) => {
                    for (k, v) in map {
                        kwargs.insert(k.clone(), v.clone());
                    }
                }
                _ => {}
            }
        }
        (args, kwargs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::signature::Param;
    use serde_json::json;

    type JsonBinding = Binding<Value>;

    fn sig_abc() -> Signature {
        Signature::new(vec![
            Param::positional("a"),
            Param::positional("b"),
            Param::positional_with_default("c", json!(10)),
        ])
        .unwrap()
    }

    #[test]
    fn test_bind_applies_defaults() {
        let b = JsonBinding::bind(&sig_abc(), vec![json!(1), json!(2)], BTreeMap::new()).unwrap();
        let (args, kwargs) = b.flatten();
        assert_eq!(args, vec![json!(1), json!(2), json!(10)]);
        assert!(kwargs.is_empty());
    }

    #[test]
    fn test_bind_by_keyword_matches_positional_call() {
        let by_pos =
            JsonBinding::bind(&sig_abc(), vec![json!(1), json!(2), json!(3)], BTreeMap::new())
                .unwrap();
        let mut kwargs = BTreeMap::new();
        kwargs.insert("b".to_string(), json!(2));
        kwargs.insert("c".to_string(), json!(3));
        let by_kw = JsonBinding::bind(&sig_abc(), vec![json!(1)], kwargs).unwrap();
        assert_eq!(by_pos.flatten(), by_kw.flatten());
    }

    #[test]
    fn test_bind_rejects_arity_mismatch() {
        let too_many = JsonBinding::bind(
            &sig_abc(),
            vec![json!(1), json!(2), json!(3), json!(4)],
            BTreeMap::new(),
        );
        assert!(matches!(too_many, Err(RmsError::BindingError(_))));

        let missing = JsonBinding::bind(&sig_abc(), vec![json!(1)], BTreeMap::new());
        assert!(matches!(missing, Err(RmsError::BindingError(_))));
    }

    #[test]
    fn test_bind_rejects_duplicate_and_unknown_keywords() {
        let mut dup = BTreeMap::new();
        dup.insert("a".to_string(), json!(9));
        let err = JsonBinding::bind(&sig_abc(), vec![json!(1), json!(2)], dup);
        assert!(matches!(err, Err(RmsError::BindingError(_))));

        let mut unknown = BTreeMap::new();
        unknown.insert("zz".to_string(), json!(0));
        let err = JsonBinding::bind(&sig_abc(), vec![json!(1), json!(2)], unknown);
        assert!(matches!(err, Err(RmsError::BindingError(_))));
    }

    #[test]
    fn test_variadic_slots() {
        let sig = Signature::new(vec![
            Param::positional("a"),
            Param::var_positional("rest"),
            Param::var_keyword("extra"),
        ])
        .unwrap();
        let mut kwargs = BTreeMap::new();
        kwargs.insert("x".to_string(), json!(true));
        let b = JsonBinding::bind(&sig, vec![json!(1), json!(2), json!(3)], kwargs).unwrap();
        let (args, kw) = b.flatten();
        assert_eq!(args, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(kw.get("x"), Some(&json!(true)));
    }

    #[test]
    fn test_partial_binding_and_completion() {
        let sig = sig_abc();
        let b = JsonBinding::bind_partial(&sig, vec![json!(1)], BTreeMap::new()).unwrap();
        assert!(!b.is_complete());

        let mut b = b;
        b.set_argument("b", BoundValue::Single(json!(2))).unwrap();
        assert!(b.is_complete());
        let (args, _) = b.flatten();
        assert_eq!(args, vec![json!(1), json!(2), json!(10)]);
    }

    #[test]
    fn test_partial_gap_flattens_by_name() {
        let sig = sig_abc();
        let mut kwargs = BTreeMap::new();
        kwargs.insert("b".to_string(), json!(5));
        let b = JsonBinding::bind_partial(&sig, vec![], kwargs).unwrap();
        let (args, kw) = b.flatten();
        assert!(args.is_empty());
        assert_eq!(kw.get("b"), Some(&json!(5)));
        assert_eq!(kw.get("c"), Some(&json!(10)));
    }

    #[test]
    fn test_substitute_rewrites_all_slot_shapes() {
        let sig = Signature::new(vec![
            Param::positional("a"),
            Param::var_positional("rest"),
            Param::var_keyword("extra"),
        ])
        .unwrap();
        let mut kwargs = BTreeMap::new();
        kwargs.insert("k".to_string(), json!("old"));
        let mut b =
            JsonBinding::bind(&sig, vec![json!("old"), json!("old"), json!("keep")], kwargs)
                .unwrap();
        b.substitute_with(|v| (v == &json!("old")).then(|| json!("new")));
        let (args, kw) = b.flatten();
        assert_eq!(args, vec![json!("new"), json!("new"), json!("keep")]);
        assert_eq!(kw.get("k"), Some(&json!("new")));
    }
}
