// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Generic Entry ID Value Object
//!
//! Type-safe identifiers for catalog entries. Every entry id is 128 random
//! bits rendered as 32 lowercase hex characters, and the phantom category
//! parameter prevents mixing ids of different entry kinds at compile time.
//!
//! ## Key properties
//!
//! - **Type safety**: a `PipeId` is not assignable where a `TaskId` is
//!   expected, with zero runtime overhead
//! - **Stable format**: 32 lowercase hex characters, safe in file names
//!   and SQL text columns
//! - **Validation**: parsing rejects anything that is not exactly 32
//!   lowercase hex characters

use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::RmsError;

/// Marker trait tying an id to its entry category.
pub trait IdCategory {
    /// Human-readable category name used in error messages.
    fn category() -> &'static str;
}

macro_rules! id_category {
    ($name:ident, $label:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl IdCategory for $name {
            fn category() -> &'static str {
                $label
            }
        }
    };
}

id_category!(PipeCategory, "pipe");
id_category!(ResourceCategory, "resource");
id_category!(FileCategory, "file");
id_category!(TaskCategory, "task");
id_category!(UnrunTaskCategory, "unruntask");
id_category!(VirtualResourceCategory, "virtualresource");

/// A 128-bit random identifier rendered as 32 lowercase hex characters.
///
/// The phantom parameter `C` names the entry category the id belongs to.
pub struct EntryId<C: IdCategory> {
    value: String,
    _category: PhantomData<C>,
}

pub type PipeId = EntryId<PipeCategory>;
pub type ResourceId = EntryId<ResourceCategory>;
pub type FileId = EntryId<FileCategory>;
pub type TaskId = EntryId<TaskCategory>;
pub type UnrunTaskId = EntryId<UnrunTaskCategory>;
pub type VirtualResourceId = EntryId<VirtualResourceCategory>;

impl<C: IdCategory> EntryId<C> {
    /// Mints a fresh random id.
    pub fn new() -> Self {
        Self {
            value: Uuid::new_v4().simple().to_string(),
            _category: PhantomData,
        }
    }

    /// Parses an id from its hex representation.
    ///
    /// # Errors
    /// Returns `RmsError::InvalidInput` when the string is not exactly 32
    /// lowercase hex characters.
    pub fn parse(s: &str) -> Result<Self, RmsError> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(RmsError::invalid_input(format!(
                "malformed {} id: {:?}",
                C::category(),
                s
            )));
        }
        Ok(Self {
            value: s.to_string(),
            _category: PhantomData,
        })
    }

    /// The raw hex representation.
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<C: IdCategory> Default for EntryId<C> {
    fn default() -> Self {
        Self::new()
    }
}

// Manual impls: derives would put an unnecessary bound on `C`.
impl<C: IdCategory> Clone for EntryId<C> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            _category: PhantomData,
        }
    }
}

impl<C: IdCategory> PartialEq for EntryId<C> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<C: IdCategory> Eq for EntryId<C> {}

impl<C: IdCategory> PartialOrd for EntryId<C> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<C: IdCategory> Ord for EntryId<C> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<C: IdCategory> Hash for EntryId<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<C: IdCategory> fmt::Debug for EntryId<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", C::category(), self.value)
    }
}

impl<C: IdCategory> Display for EntryId<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<C: IdCategory> std::str::FromStr for EntryId<C> {
    type Err = RmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<C: IdCategory> Serialize for EntryId<C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, C: IdCategory> Deserialize<'de> for EntryId<C> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_ids_are_32_hex_chars() {
        let id = PipeId::new();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_new_ids_are_unique() {
        let ids: HashSet<String> = (0..64).map(|_| TaskId::new().as_str().to_string()).collect();
        assert_eq!(ids.len(), 64);
    }

    #[test]
    fn test_parse_round_trip() {
        let id = ResourceId::new();
        let parsed = ResourceId::parse(id.as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(FileId::parse("short").is_err());
        assert!(FileId::parse("G0000000000000000000000000000000").is_err());
        assert!(FileId::parse("ABCDEF00000000000000000000000000").is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let id = VirtualResourceId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: VirtualResourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
