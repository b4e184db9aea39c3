// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Catalog Change Events
//!
//! Every mutating registry operation emits one batch of `(kind, full id)`
//! events after its transaction commits. Subscribers observe batches in
//! commit order; within a batch, events follow insertion order.

use serde::{Deserialize, Serialize};

use crate::value_objects::FullId;

/// What happened to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Insert,
    Modify,
    Delete,
    /// A resource's content was assigned outside a recorded execution,
    /// e.g. by an auto-fetch re-run.
    ContentChange,
}

/// One change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RmsEvent {
    pub kind: EventKind,
    pub full_id: FullId,
}

impl RmsEvent {
    pub fn insert(full_id: FullId) -> Self {
        Self { kind: EventKind::Insert, full_id }
    }

    pub fn modify(full_id: FullId) -> Self {
        Self { kind: EventKind::Modify, full_id }
    }

    pub fn delete(full_id: FullId) -> Self {
        Self { kind: EventKind::Delete, full_id }
    }

    pub fn content_change(full_id: FullId) -> Self {
        Self { kind: EventKind::ContentChange, full_id }
    }
}
