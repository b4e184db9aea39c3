// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Entity
//!
//! A resource is the value a task returned. Its content may be held in
//! memory, dumped to the content store, or absent (regenerable through
//! lineage re-execution). Volatile resources have one-shot read
//! semantics: the first in-memory read consumes the value, so producers
//! of large intermediates are not forced to retain them.

use serde_json::Value;

use crate::error::RmsError;
use crate::value_objects::{EntryKind, FullId, InfoMap, ResourceId, Tags, TaskId};

use super::entry::RmsEntry;

/// A value produced by a task.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: ResourceId,
    /// The producing task; `None` for externally inserted resources.
    pub task_id: Option<TaskId>,
    /// One-shot in-memory read semantics when true.
    pub volatile: bool,
    pub description: String,
    pub tags: Tags,
    pub info: InfoMap,
    content: Option<Value>,
    has_content: bool,
    /// Set once a volatile read consumed the in-memory value.
    consumed: bool,
}

impl Resource {
    pub fn new(
        id: ResourceId,
        task_id: Option<TaskId>,
        volatile: bool,
        description: String,
        tags: Tags,
        info: InfoMap,
        content: Option<Value>,
    ) -> Self {
        let has_content = content.is_some();
        Self {
            id,
            task_id,
            volatile,
            description,
            tags,
            info,
            content,
            has_content,
            consumed: false,
        }
    }

    pub fn has_content(&self) -> bool {
        self.has_content
    }

    /// True once a volatile read consumed the in-memory value.
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Reads the in-memory content.
    ///
    /// For volatile resources the first read consumes the value; further
    /// reads fail with `ResourceNotReady` until content is reassigned.
    pub fn content(&mut self) -> Result<Value, RmsError> {
        if !self.has_content {
            return Err(RmsError::resource_not_ready(format!(
                "no content held in memory for resource {}",
                self.id
            )));
        }
        if self.volatile {
            self.has_content = false;
            self.consumed = true;
            Ok(self
                .content
                .take()
                .unwrap_or(Value::Null))
        } else {
            Ok(self.content.clone().unwrap_or(Value::Null))
        }
    }

    /// Non-consuming view of the in-memory content.
    pub fn peek_content(&self) -> Option<&Value> {
        if self.has_content {
            self.content.as_ref()
        } else {
            None
        }
    }

    /// Assigns content, clearing the consumed marker.
    pub fn set_content(&mut self, value: Value) {
        self.content = Some(value);
        self.has_content = true;
        self.consumed = false;
    }

    pub fn clear_content(&mut self) {
        self.content = None;
        self.has_content = false;
    }
}

impl RmsEntry for Resource {
    fn kind(&self) -> EntryKind {
        EntryKind::Resource
    }

    fn full_id(&self) -> FullId {
        FullId::Resource(self.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn volatile_resource(value: Value) -> Resource {
        Resource::new(
            ResourceId::new(),
            None,
            true,
            String::new(),
            Tags::new(),
            InfoMap::new(),
            Some(value),
        )
    }

    #[test]
    fn test_volatile_content_is_one_shot() {
        let mut r = volatile_resource(json!([1, 2, 3]));
        assert_eq!(r.content().unwrap(), json!([1, 2, 3]));
        assert!(r.is_consumed());
        let second = r.content();
        assert!(matches!(second, Err(RmsError::ResourceNotReady(_))));
    }

    #[test]
    fn test_non_volatile_content_is_repeatable() {
        let mut r = Resource::new(
            ResourceId::new(),
            None,
            false,
            String::new(),
            Tags::new(),
            InfoMap::new(),
            Some(json!("v")),
        );
        assert_eq!(r.content().unwrap(), json!("v"));
        assert_eq!(r.content().unwrap(), json!("v"));
        assert!(!r.is_consumed());
    }

    #[test]
    fn test_set_content_resets_consumed() {
        let mut r = volatile_resource(json!(1));
        let _ = r.content().unwrap();
        r.set_content(json!(2));
        assert!(!r.is_consumed());
        assert_eq!(r.content().unwrap(), json!(2));
    }
}
