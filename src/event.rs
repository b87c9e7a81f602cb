//! Scheduled events and timer handles.
//!
//! Every pending timer or delayed message is a [`ScheduledEvent`] sitting
//! in the [`EventQueue`](crate::scheduler::EventQueue). Events are ordered
//! by `(due, id)` so that equal due times fire in scheduling order.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::message::Message;
use crate::time::VirtualTime;

// ── Timer handle ──────────────────────────────────────────────────────

/// Opaque handle returned by `schedule`, accepted only by `cancel`.
///
/// Handles are strictly increasing per queue, which also makes them the
/// sequence number that breaks ties between events due at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TimerId(u64);

impl TimerId {
    /// Wrap a raw value.
    #[inline]
    pub fn new(raw: u64) -> Self {
        TimerId(raw)
    }

    /// Return the raw value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

// ── Sequence generator ───────────────────────────────────────────────

/// Deterministic, strictly-increasing timer-ID generator.
#[derive(Debug, Clone, Default)]
pub struct SequenceGen {
    next: u64,
}

impl SequenceGen {
    /// Create a generator starting at 0.
    pub fn new() -> Self {
        SequenceGen { next: 0 }
    }

    /// Mint the next handle.
    pub fn next_id(&mut self) -> TimerId {
        let id = TimerId(self.next);
        self.next += 1;
        id
    }

    /// Peek at the next handle without consuming it.
    pub fn peek(&self) -> TimerId {
        TimerId(self.next)
    }
}

// ── Recipient ─────────────────────────────────────────────────────────

/// The target of a scheduled event.
///
/// Delivery must not block: implementations enqueue the payload and
/// return. A recipient that has gone away simply drops the payload.
pub trait Recipient: Send + Sync {
    /// Hand `payload` to the recipient. `timer` is the handle the event
    /// was scheduled under.
    fn deliver(&self, timer: TimerId, payload: Message);

    /// Short label for logs.
    fn label(&self) -> String {
        "recipient".to_string()
    }
}

// ── Scheduled event ───────────────────────────────────────────────────

/// A single pending delivery.
#[derive(Clone)]
pub struct ScheduledEvent {
    /// Handle and tie-breaking sequence number.
    pub id: TimerId,
    /// The virtual time at which the event fires.
    pub due: VirtualTime,
    /// Who receives the payload.
    pub target: Arc<dyn Recipient>,
    /// What is delivered.
    pub payload: Message,
}

impl ScheduledEvent {
    /// Convenience constructor.
    pub fn new(
        id: TimerId,
        due: VirtualTime,
        target: Arc<dyn Recipient>,
        payload: Message,
    ) -> Self {
        ScheduledEvent {
            id,
            due,
            target,
            payload,
        }
    }

    /// Deliver the payload to the target, consuming the event.
    pub fn fire(self) {
        self.target.deliver(self.id, self.payload);
    }
}

impl fmt::Debug for ScheduledEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledEvent")
            .field("id", &self.id)
            .field("due", &self.due)
            .field("target", &self.target.label())
            .field("payload", &self.payload)
            .finish()
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.id == other.id
    }
}

impl Eq for ScheduledEvent {}

/// Ordering: smallest `(due, id)` first.
///
/// `BinaryHeap` is a max-heap, so the natural ordering is reversed here
/// to turn it into a min-heap.
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Collects every delivery for inspection.
    #[derive(Default)]
    pub(crate) struct Collector {
        pub(crate) got: Mutex<Vec<(TimerId, Message)>>,
    }

    impl Recipient for Collector {
        fn deliver(&self, timer: TimerId, payload: Message) {
            self.got.lock().push((timer, payload));
        }
    }

    fn event(id: u64, due: u64) -> ScheduledEvent {
        ScheduledEvent::new(
            TimerId::new(id),
            VirtualTime::from_millis(due),
            Arc::new(Collector::default()),
            Message::Empty,
        )
    }

    #[test]
    fn test_sequence_monotonic() {
        let mut gen = SequenceGen::new();
        let a = gen.next_id();
        let b = gen.next_id();
        assert_eq!(a.raw(), 0);
        assert_eq!(b.raw(), 1);
        assert_eq!(gen.peek().raw(), 2);
    }

    #[test]
    fn test_ordering_by_due() {
        // Earlier due → "greater" in reversed ordering.
        assert!(event(0, 10) > event(1, 20));
    }

    #[test]
    fn test_ordering_tiebreak_by_id() {
        assert!(event(0, 10) > event(1, 10));
    }

    #[test]
    fn test_fire_delivers_to_target() {
        let collector = Arc::new(Collector::default());
        let ev = ScheduledEvent::new(
            TimerId::new(4),
            VirtualTime::ZERO,
            collector.clone(),
            Message::atom("ping"),
        );
        ev.fire();
        assert_eq!(*collector.got.lock(), vec![(TimerId::new(4), Message::atom("ping"))]);
    }
}
