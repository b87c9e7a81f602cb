//! The virtual clock: a shared, serialized owner of one [`EventQueue`].
//!
//! Every `schedule`, `cancel` and `advance` request passes through the
//! same clock handle. Queue mutations take a short `parking_lot` lock;
//! `advance` calls are additionally serialized by an async mutex so two
//! drivers can never interleave their batches.
//!
//! # Per-timestamp barrier
//!
//! `advance` pops every event due at the earliest timestamp, delivers the
//! whole batch, yields once, and then waits on the clock's [`Activity`]
//! tracker until every actor bound to this clock has finished reacting.
//! Reactions may schedule new events; anything due at or before the
//! advance target is picked up by the same call.
//!
//! Within one batch, actors react in delivery order only on a
//! current-thread runtime. On a multi-thread runtime the barrier still
//! holds but the order of reactions inside a timestamp does not.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, trace};

use crate::error::{SimError, SimResult};
use crate::event::{Recipient, TimerId};
use crate::message::Message;
use crate::scheduler::EventQueue;
use crate::time::VirtualTime;

// ── Activity ──────────────────────────────────────────────────────────

/// Counts deliveries that have been handed to an actor but not yet
/// fully processed.
///
/// Actors bound to a virtual clock report every mailbox entry here; the
/// clock waits for the count to reach zero before moving past a
/// timestamp.
#[derive(Debug, Default)]
pub struct Activity {
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Activity {
    /// Create an idle tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more unit of outstanding work.
    pub fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark one unit of work as finished.
    pub fn end(&self) {
        let prev = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "activity counter underflow");
        if prev == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Number of outstanding units.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no work is outstanding.
    pub async fn settled(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent `end` is not missed.
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

// ── VirtualClock ──────────────────────────────────────────────────────

struct ClockState {
    queue: EventQueue,
    now: VirtualTime,
    closed: bool,
}

struct ClockInner {
    state: Mutex<ClockState>,
    advancing: tokio::sync::Mutex<()>,
    activity: Arc<Activity>,
}

/// Cloneable handle to a virtual clock. Clones share the same queue.
#[derive(Clone)]
pub struct VirtualClock {
    inner: Arc<ClockInner>,
}

impl VirtualClock {
    /// Create a clock at `T=0` with an empty queue.
    pub fn new() -> Self {
        Self::starting_at(VirtualTime::ZERO)
    }

    /// Create a clock at a specific time.
    pub fn starting_at(time: VirtualTime) -> Self {
        VirtualClock {
            inner: Arc::new(ClockInner {
                state: Mutex::new(ClockState {
                    queue: EventQueue::new(),
                    now: time,
                    closed: false,
                }),
                advancing: tokio::sync::Mutex::new(()),
                activity: Arc::new(Activity::new()),
            }),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> VirtualTime {
        self.inner.state.lock().now
    }

    /// The barrier tracker shared by every actor bound to this clock.
    pub fn activity(&self) -> Arc<Activity> {
        self.inner.activity.clone()
    }

    /// Returns `true` if both handles refer to the same clock.
    pub fn same_clock(&self, other: &VirtualClock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Schedule `payload` for `target`, `delay` ms from now.
    ///
    /// A zero delay fires on the next advance step, never inside this
    /// call.
    pub fn schedule(
        &self,
        delay: u64,
        target: Arc<dyn Recipient>,
        payload: Message,
    ) -> SimResult<TimerId> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(SimError::ClockStopped);
        }
        let due = state.now.plus(delay).ok_or(SimError::TimeOverflow)?;
        let id = state.queue.schedule(due, target, payload);
        trace!(timer = %id, %due, "scheduled");
        Ok(id)
    }

    /// Schedule `payload` for `target` at an absolute time.
    ///
    /// Times before `now()` are rejected rather than clamped.
    pub fn schedule_at(
        &self,
        at: VirtualTime,
        target: Arc<dyn Recipient>,
        payload: Message,
    ) -> SimResult<TimerId> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(SimError::ClockStopped);
        }
        if at.is_before(state.now) {
            return Err(SimError::NonCausalEvent {
                requested: at.as_millis(),
                current: state.now.as_millis(),
            });
        }
        let id = state.queue.schedule(at, target, payload);
        trace!(timer = %id, due = %at, "scheduled");
        Ok(id)
    }

    /// Cancel a pending event. Idempotent; fired or unknown handles are
    /// ignored.
    pub fn cancel(&self, id: TimerId) -> bool {
        let cancelled = self.inner.state.lock().queue.cancel(id);
        if cancelled {
            trace!(timer = %id, "cancelled");
        }
        cancelled
    }

    /// Number of pending events.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Due time of the earliest pending event.
    pub fn next_due(&self) -> Option<VirtualTime> {
        self.inner.state.lock().queue.next_due()
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Advance virtual time by `duration` ms, firing everything due on
    /// the way. Returns the number of events fired.
    ///
    /// `now()` ends at exactly `now + duration`, even when nothing fired.
    pub async fn advance(&self, duration: u64) -> SimResult<usize> {
        let _serial = self.inner.advancing.lock().await;
        let target = {
            let state = self.inner.state.lock();
            if state.closed {
                return Err(SimError::ClockStopped);
            }
            state.now.plus(duration).ok_or(SimError::TimeOverflow)?
        };
        self.run_until(target).await
    }

    /// Advance to an absolute time. Times in the past are rejected.
    pub async fn advance_to(&self, target: VirtualTime) -> SimResult<usize> {
        let _serial = self.inner.advancing.lock().await;
        {
            let state = self.inner.state.lock();
            if state.closed {
                return Err(SimError::ClockStopped);
            }
            if target.is_before(state.now) {
                return Err(SimError::NonCausalEvent {
                    requested: target.as_millis(),
                    current: state.now.as_millis(),
                });
            }
        }
        self.run_until(target).await
    }

    /// Jump to the earliest pending due time and fire that batch.
    ///
    /// An empty queue is a no-op returning `Ok(None)`.
    pub async fn advance_to_next(&self) -> SimResult<Option<VirtualTime>> {
        let _serial = self.inner.advancing.lock().await;
        let next = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(SimError::ClockStopped);
            }
            state.queue.next_due()
        };
        match next {
            Some(due) => {
                self.run_until(due).await?;
                Ok(Some(due))
            }
            None => Ok(None),
        }
    }

    async fn run_until(&self, target: VirtualTime) -> SimResult<usize> {
        let mut fired = 0;
        loop {
            let batch = {
                let mut state = self.inner.state.lock();
                if state.closed {
                    return Err(SimError::ClockStopped);
                }
                match state.queue.next_due() {
                    Some(due) if due <= target => {
                        state.now = due;
                        state.queue.pop_batch()
                    }
                    _ => break,
                }
            };
            if let Some(first) = batch.first() {
                debug!(at = %first.due, events = batch.len(), "delivering batch");
            }
            fired += batch.len();
            for event in batch {
                event.fire();
            }
            tokio::task::yield_now().await;
            self.inner.activity.settled().await;
        }
        let mut state = self.inner.state.lock();
        if state.now < target {
            state.now = target;
        }
        Ok(fired)
    }

    /// Block the caller until `duration` ms of virtual time have passed.
    ///
    /// Some other task must drive the clock; a task that is the only
    /// advancer of this clock must not sleep on it.
    pub async fn sleep(&self, duration: u64) -> SimResult<()> {
        let (tx, rx) = oneshot::channel();
        self.schedule(
            duration,
            Arc::new(Wake(Mutex::new(Some(tx)))),
            Message::Empty,
        )?;
        rx.await.map_err(|_| SimError::ClockStopped)
    }

    /// Tear the clock down. Pending events are dropped, sleepers wake
    /// with [`SimError::ClockStopped`], and later requests are rejected.
    pub fn shutdown(&self) {
        let dropped = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.queue.drain_ordered()
        };
        if !dropped.is_empty() {
            debug!(events = dropped.len(), "clock shut down with pending events");
        }
        // Dropped outside the lock: sleepers observe a closed channel.
        drop(dropped);
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("VirtualClock")
            .field("now", &state.now)
            .field("pending", &state.queue.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// Wakes a virtual-time sleeper.
struct Wake(Mutex<Option<oneshot::Sender<()>>>);

impl Recipient for Wake {
    fn deliver(&self, _timer: TimerId, _payload: Message) {
        if let Some(tx) = self.0.lock().take() {
            let _ = tx.send(());
        }
    }

    fn label(&self) -> String {
        "sleeper".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::Collector;

    fn at(ms: u64) -> VirtualTime {
        VirtualTime::from_millis(ms)
    }

    /// Reschedules itself `delay` ms later every time it fires, up to `limit`.
    struct Repeater {
        clock: VirtualClock,
        me: Mutex<Option<Arc<Repeater>>>,
        delay: u64,
        limit: u64,
        fired_at: Mutex<Vec<u64>>,
    }

    impl Recipient for Repeater {
        fn deliver(&self, _timer: TimerId, _payload: Message) {
            let now = self.clock.now().as_millis();
            self.fired_at.lock().push(now);
            if now + self.delay <= self.limit {
                if let Some(me) = self.me.lock().clone() {
                    self.clock.schedule(self.delay, me, Message::Empty).unwrap();
                }
            }
        }
    }

    #[tokio::test]
    async fn test_advance_fires_due_events_in_order() {
        let clock = VirtualClock::new();
        let sink = Arc::new(Collector::default());
        clock.schedule(30, sink.clone(), Message::atom("c")).unwrap();
        clock.schedule(10, sink.clone(), Message::atom("a")).unwrap();
        clock.schedule(20, sink.clone(), Message::atom("b")).unwrap();
        clock.schedule(50, sink.clone(), Message::atom("late")).unwrap();

        let fired = clock.advance(30).await.unwrap();
        assert_eq!(fired, 3);
        assert_eq!(clock.now(), at(30));
        let got: Vec<_> = sink.got.lock().iter().map(|(_, m)| m.clone()).collect();
        assert_eq!(got, vec![Message::atom("a"), Message::atom("b"), Message::atom("c")]);
        assert_eq!(clock.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_advance_sets_now_even_when_idle() {
        let clock = VirtualClock::new();
        assert_eq!(clock.advance(250).await.unwrap(), 0);
        assert_eq!(clock.now(), at(250));
    }

    #[tokio::test]
    async fn test_zero_delay_fires_on_next_advance() {
        let clock = VirtualClock::new();
        let sink = Arc::new(Collector::default());
        clock.schedule(0, sink.clone(), Message::Empty).unwrap();
        assert!(sink.got.lock().is_empty());
        clock.advance(0).await.unwrap();
        assert_eq!(sink.got.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_reactions_within_window_fire_in_same_call() {
        let clock = VirtualClock::new();
        let repeater = Arc::new(Repeater {
            clock: clock.clone(),
            me: Mutex::new(None),
            delay: 100,
            limit: 1_000,
            fired_at: Mutex::new(Vec::new()),
        });
        *repeater.me.lock() = Some(repeater.clone());
        clock.schedule(100, repeater.clone(), Message::Empty).unwrap();

        clock.advance(1_000).await.unwrap();
        let fired = repeater.fired_at.lock().clone();
        assert_eq!(fired, (1..=10).map(|i| i * 100).collect::<Vec<_>>());
        // Break the self-reference cycle.
        repeater.me.lock().take();
    }

    #[tokio::test]
    async fn test_monotonic_across_advances() {
        let clock = VirtualClock::new();
        let mut last = clock.now();
        for step in [0, 5, 0, 17, 3] {
            clock.advance(step).await.unwrap();
            assert!(clock.now() >= last);
            last = clock.now();
        }
        assert_eq!(clock.now(), at(25));
    }

    #[tokio::test]
    async fn test_cancel_prevents_delivery() {
        let clock = VirtualClock::new();
        let sink = Arc::new(Collector::default());
        let id = clock.schedule(10, sink.clone(), Message::Empty).unwrap();
        assert!(clock.cancel(id));
        assert!(!clock.cancel(id));
        clock.advance(20).await.unwrap();
        assert!(sink.got.lock().is_empty());
        assert!(!clock.cancel(id));
    }

    #[tokio::test]
    async fn test_advance_to_next() {
        let clock = VirtualClock::new();
        let sink = Arc::new(Collector::default());
        assert_eq!(clock.advance_to_next().await.unwrap(), None);
        assert_eq!(clock.now(), VirtualTime::ZERO);

        clock.schedule(40, sink.clone(), Message::atom("x")).unwrap();
        clock.schedule(40, sink.clone(), Message::atom("y")).unwrap();
        clock.schedule(90, sink.clone(), Message::atom("z")).unwrap();

        assert_eq!(clock.advance_to_next().await.unwrap(), Some(at(40)));
        assert_eq!(clock.now(), at(40));
        assert_eq!(sink.got.lock().len(), 2);
        assert_eq!(clock.next_due(), Some(at(90)));
    }

    #[tokio::test]
    async fn test_schedule_at_rejects_past() {
        let clock = VirtualClock::new();
        clock.advance(100).await.unwrap();
        let sink = Arc::new(Collector::default());
        let err = clock.schedule_at(at(50), sink.clone(), Message::Empty).unwrap_err();
        assert_eq!(err, SimError::NonCausalEvent { requested: 50, current: 100 });
        assert!(clock.schedule_at(at(100), sink, Message::Empty).is_ok());
        assert!(clock.advance_to(at(10)).await.is_err());
    }

    #[tokio::test]
    async fn test_sleep_wakes_when_driven() {
        let clock = VirtualClock::new();
        let sleeper = {
            let clock = clock.clone();
            tokio::spawn(async move {
                clock.sleep(500).await.unwrap();
                clock.now()
            })
        };
        // Let the sleeper register its wake event.
        while clock.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        clock.advance(499).await.unwrap();
        assert!(!sleeper.is_finished());
        clock.advance(1).await.unwrap();
        assert_eq!(sleeper.await.unwrap(), at(500));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_requests() {
        let clock = VirtualClock::new();
        let sink = Arc::new(Collector::default());
        clock.schedule(10, sink.clone(), Message::Empty).unwrap();
        clock.shutdown();
        assert!(clock.is_stopped());
        assert_eq!(clock.pending_count(), 0);
        assert_eq!(clock.schedule(1, sink, Message::Empty), Err(SimError::ClockStopped));
        assert_eq!(clock.advance(1).await, Err(SimError::ClockStopped));
        assert_eq!(clock.sleep(1).await, Err(SimError::ClockStopped));
    }

    #[tokio::test]
    async fn test_activity_settled() {
        let activity = Arc::new(Activity::new());
        activity.settled().await;
        activity.begin();
        let waiter = {
            let activity = activity.clone();
            tokio::spawn(async move { activity.settled().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        activity.end();
        waiter.await.unwrap();
        assert_eq!(activity.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_advances_are_serialized() {
        let clock = VirtualClock::new();
        let sink = Arc::new(Collector::default());
        for i in 1..=200i64 {
            clock.schedule(i as u64 * 5, sink.clone(), Message::from(i)).unwrap();
        }

        let first = tokio::spawn({
            let clock = clock.clone();
            async move { clock.advance(500).await }
        });
        let second = tokio::spawn({
            let clock = clock.clone();
            async move { clock.advance(500).await }
        });
        let fired = first.await.unwrap().unwrap() + second.await.unwrap().unwrap();

        assert_eq!(fired, 200);
        assert_eq!(clock.now(), at(1_000));
        assert_eq!(clock.pending_count(), 0);
        let got: Vec<i64> = sink.got.lock().iter().filter_map(|(_, m)| m.as_int()).collect();
        assert_eq!(got, (1..=200).collect::<Vec<_>>());
    }
}
