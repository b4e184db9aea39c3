// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Change Event Bus
//!
//! Mutations publish one event batch per committed transaction.
//! Subscribers hold their own unbounded channel and drain it at their own
//! pace, so a slow subscriber never stalls a mutation. Batches arrive in
//! commit order; within a batch, events follow insertion order.
//!
//! Subscribers that dropped their receiver are pruned on the next
//! emission.

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::trace;

use rms_domain::RmsEvent;

/// Fan-out channel for catalog change events.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<Vec<RmsEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber and returns its private receiver.
    pub fn subscribe(&self) -> Receiver<Vec<RmsEvent>> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Publishes one batch to every live subscriber.
    pub fn emit(&self, batch: Vec<RmsEvent>) {
        if batch.is_empty() {
            return;
        }
        trace!(events = batch.len(), "emitting event batch");
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(batch.clone()).is_ok());
    }

    /// Number of live subscribers (primarily for diagnostics).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rms_domain::value_objects::TaskId;

    fn batch() -> Vec<RmsEvent> {
        vec![RmsEvent::insert(TaskId::new().into())]
    }

    #[test]
    fn test_subscribers_receive_batches_in_order() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let first = batch();
        let second = batch();
        bus.emit(first.clone());
        bus.emit(second.clone());
        assert_eq!(rx.recv().unwrap(), first);
        assert_eq!(rx.recv().unwrap(), second);
    }

    #[test]
    fn test_empty_batches_are_not_emitted() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        bus.emit(vec![]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        let rx2 = bus.subscribe();
        bus.emit(batch());
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(rx2.recv().unwrap().len(), 1);
    }
}
