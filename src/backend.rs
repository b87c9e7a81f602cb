//! Pluggable time backends.
//!
//! An actor never talks to timers directly. It is bound, once, to a
//! [`TimeBackend`] and routes every delayed message, cancellation and
//! sleep through it:
//!
//! ```text
//!            ┌──────────────┐
//!  actor ──▶ │ TimeBackend  │
//!            └──────┬───────┘
//!          ┌────────┴─────────┐
//!   RealBackend         VirtualBackend
//!   (tokio timers)      (VirtualClock queue)
//! ```
//!
//! Both strategies dispatch asynchronously, including for a zero delay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::trace;

use crate::clock::{Activity, VirtualClock};
use crate::error::{SimError, SimResult};
use crate::event::{Recipient, TimerId};
use crate::message::Message;
use crate::time::VirtualTime;

/// Which flavour of time a backend provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Operating-system timers.
    Real,
    /// A virtual clock advanced by a driver.
    Virtual,
}

/// Scheduling capability bound to an actor for its whole lifetime.
#[async_trait]
pub trait TimeBackend: Send + Sync + std::fmt::Debug {
    /// Which kind of time this is.
    fn kind(&self) -> BackendKind;

    /// Current time as seen by this backend, in ms.
    fn now(&self) -> VirtualTime;

    /// Deliver `payload` to `target` after `delay` ms.
    fn schedule_message(
        &self,
        target: Arc<dyn Recipient>,
        payload: Message,
        delay: u64,
    ) -> SimResult<TimerId>;

    /// Best-effort cancel. Never fails; returns whether anything was
    /// actually cancelled.
    fn cancel(&self, handle: TimerId) -> bool;

    /// Suspend the caller for `duration` ms of this backend's time.
    async fn sleep(&self, duration: u64) -> SimResult<()>;

    /// Barrier tracker for actors bound to this backend, if the backend
    /// needs to know when they have finished reacting.
    fn activity(&self) -> Option<Arc<Activity>> {
        None
    }
}

// ── Real ──────────────────────────────────────────────────────────────

/// Wall-clock backend built on tokio timers.
#[derive(Debug)]
pub struct RealBackend {
    started: Instant,
    next_id: AtomicU64,
    timers: Arc<Mutex<HashMap<TimerId, AbortHandle>>>,
    closed: AtomicBool,
}

impl RealBackend {
    /// Create a backend whose `now()` counts from this instant.
    pub fn new() -> Self {
        RealBackend {
            started: Instant::now(),
            next_id: AtomicU64::new(0),
            timers: Arc::new(Mutex::new(HashMap::new())),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn pending_count(&self) -> usize {
        self.timers.lock().len()
    }

    /// Cancel every pending timer and reject future requests.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for (_, handle) in self.timers.lock().drain() {
            handle.abort();
        }
    }
}

impl Default for RealBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimeBackend for RealBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Real
    }

    fn now(&self) -> VirtualTime {
        VirtualTime::from_millis(self.started.elapsed().as_millis() as u64)
    }

    fn schedule_message(
        &self,
        target: Arc<dyn Recipient>,
        payload: Message,
        delay: u64,
    ) -> SimResult<TimerId> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SimError::ClockStopped);
        }
        let runtime = Handle::try_current().map_err(|_| SimError::NoRuntime)?;
        let id = TimerId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let timers = self.timers.clone();

        // Hold the table lock across spawn so a zero-delay timer cannot
        // remove its entry before it has been inserted.
        let mut table = timers.lock();
        let task = runtime.spawn({
            let timers = self.timers.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                if timers.lock().remove(&id).is_some() {
                    target.deliver(id, payload);
                }
            }
        });
        table.insert(id, task.abort_handle());
        trace!(timer = %id, delay, "real timer armed");
        Ok(id)
    }

    fn cancel(&self, handle: TimerId) -> bool {
        match self.timers.lock().remove(&handle) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    async fn sleep(&self, duration: u64) -> SimResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SimError::ClockStopped);
        }
        tokio::time::sleep(Duration::from_millis(duration)).await;
        Ok(())
    }
}

// ── Virtual ───────────────────────────────────────────────────────────

/// Backend that delegates everything to a [`VirtualClock`].
#[derive(Debug, Clone)]
pub struct VirtualBackend {
    clock: VirtualClock,
}

impl VirtualBackend {
    /// Bind to `clock`.
    pub fn new(clock: VirtualClock) -> Self {
        VirtualBackend { clock }
    }

    /// The underlying clock.
    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }
}

#[async_trait]
impl TimeBackend for VirtualBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Virtual
    }

    fn now(&self) -> VirtualTime {
        self.clock.now()
    }

    fn schedule_message(
        &self,
        target: Arc<dyn Recipient>,
        payload: Message,
        delay: u64,
    ) -> SimResult<TimerId> {
        self.clock.schedule(delay, target, payload)
    }

    fn cancel(&self, handle: TimerId) -> bool {
        self.clock.cancel(handle)
    }

    async fn sleep(&self, duration: u64) -> SimResult<()> {
        self.clock.sleep(duration).await
    }

    fn activity(&self) -> Option<Arc<Activity>> {
        Some(self.clock.activity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::Collector;

    #[tokio::test(start_paused = true)]
    async fn test_real_zero_delay_is_async() {
        let backend = RealBackend::new();
        let sink = Arc::new(Collector::default());
        backend.schedule_message(sink.clone(), Message::atom("now"), 0).unwrap();
        // Not delivered inside the call.
        assert!(sink.got.lock().is_empty());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(sink.got.lock().len(), 1);
        assert_eq!(backend.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_cancel() {
        let backend = RealBackend::new();
        let sink = Arc::new(Collector::default());
        let id = backend.schedule_message(sink.clone(), Message::Empty, 50).unwrap();
        assert!(backend.cancel(id));
        assert!(!backend.cancel(id));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sink.got.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_fires_after_delay() {
        let backend = RealBackend::new();
        let sink = Arc::new(Collector::default());
        backend.schedule_message(sink.clone(), Message::Empty, 100).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.got.lock().is_empty());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sink.got.lock().len(), 1);
        // Cancelling a fired timer is a no-op.
        assert!(!backend.cancel(TimerId::new(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_shutdown() {
        let backend = RealBackend::new();
        let sink = Arc::new(Collector::default());
        backend.schedule_message(sink.clone(), Message::Empty, 10).unwrap();
        backend.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.got.lock().is_empty());
        assert_eq!(
            backend.schedule_message(sink, Message::Empty, 1),
            Err(SimError::ClockStopped)
        );
    }

    #[test]
    fn test_real_without_runtime() {
        let backend = RealBackend::new();
        let sink = Arc::new(Collector::default());
        assert_eq!(
            backend.schedule_message(sink, Message::Empty, 1),
            Err(SimError::NoRuntime)
        );
    }

    #[tokio::test]
    async fn test_virtual_delegates_to_clock() {
        let clock = VirtualClock::new();
        let backend = VirtualBackend::new(clock.clone());
        let sink = Arc::new(Collector::default());

        let id = backend.schedule_message(sink.clone(), Message::atom("a"), 10).unwrap();
        backend.schedule_message(sink.clone(), Message::atom("b"), 20).unwrap();
        assert_eq!(clock.pending_count(), 2);
        assert!(backend.cancel(id));

        clock.advance(20).await.unwrap();
        assert_eq!(backend.now(), VirtualTime::from_millis(20));
        let got: Vec<_> = sink.got.lock().iter().map(|(_, m)| m.clone()).collect();
        assert_eq!(got, vec![Message::atom("b")]);
        assert_eq!(backend.kind(), BackendKind::Virtual);
        assert!(backend.activity().is_some());
    }
}
