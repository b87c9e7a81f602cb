//! Deterministic event queue.
//!
//! A `BinaryHeap` with reversed `Ord` on [`ScheduledEvent`] acts as a
//! min-heap keyed by `(due, id)`. Cancellation is lazy: cancelled handles
//! are remembered and skipped when they reach the top of the heap, so a
//! cancel never has to search the heap.
//!
//! The queue itself is synchronous and knows nothing about the current
//! time; [`VirtualClock`](crate::clock::VirtualClock) owns one behind a
//! mutex and drives it.

use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use crate::event::{Recipient, ScheduledEvent, SequenceGen, TimerId};
use crate::message::Message;
use crate::time::VirtualTime;

/// The pending-event store behind a virtual clock.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    /// Handles that are scheduled and neither fired nor cancelled.
    live: HashSet<TimerId>,
    /// Cancelled handles still physically in the heap.
    cancelled: HashSet<TimerId>,
    ids: SequenceGen,
}

impl EventQueue {
    /// Create a new, empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event due at `due`.
    pub fn schedule(
        &mut self,
        due: VirtualTime,
        target: Arc<dyn Recipient>,
        payload: Message,
    ) -> TimerId {
        let id = self.ids.next_id();
        self.live.insert(id);
        self.heap.push(ScheduledEvent::new(id, due, target, payload));
        id
    }

    /// Cancel a pending event. Unknown, fired, or already-cancelled
    /// handles are a no-op returning `false`.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        if self.live.remove(&id) {
            self.cancelled.insert(id);
            true
        } else {
            false
        }
    }

    /// Due time of the earliest live event.
    pub fn next_due(&mut self) -> Option<VirtualTime> {
        self.purge_cancelled_head();
        self.heap.peek().map(|e| e.due)
    }

    /// Remove and return the earliest live event.
    pub fn pop_next(&mut self) -> Option<ScheduledEvent> {
        self.purge_cancelled_head();
        let event = self.heap.pop()?;
        self.live.remove(&event.id);
        Some(event)
    }

    /// Remove and return every live event due exactly at the earliest
    /// due time, in scheduling order.
    pub fn pop_batch(&mut self) -> Vec<ScheduledEvent> {
        let Some(due) = self.next_due() else {
            return Vec::new();
        };
        let mut batch = Vec::new();
        while self.next_due() == Some(due) {
            if let Some(event) = self.pop_next() {
                batch.push(event);
            }
        }
        batch
    }

    /// Number of live (not fired, not cancelled) events.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` if no live events remain.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Drop every pending event.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
        self.cancelled.clear();
    }

    /// Drain all live events in deterministic order.
    pub fn drain_ordered(&mut self) -> Vec<ScheduledEvent> {
        let mut events = Vec::with_capacity(self.live.len());
        while let Some(e) = self.pop_next() {
            events.push(e);
        }
        events
    }

    fn purge_cancelled_head(&mut self) {
        while let Some(top) = self.heap.peek() {
            if !self.cancelled.remove(&top.id) {
                break;
            }
            self.heap.pop();
        }
    }
}
