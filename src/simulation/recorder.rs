//! Per-actor counters and the optional message trace.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::message::Message;
use crate::time::VirtualTime;

use super::trace::{Trace, TraceEvent, TraceKind};

// ── Stats ─────────────────────────────────────────────────────────────

/// Counters for one actor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ActorStats {
    pub sent_count: u64,
    pub received_count: u64,
    /// Set once the actor has failed.
    pub failure: Option<String>,
}

/// Snapshot of every actor's counters.
///
/// Rates are per second of *virtual* time and are 0 when no virtual
/// time has elapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Stats {
    /// Virtual ms elapsed since the simulation started.
    pub elapsed_ms: u64,
    /// Counters keyed by actor name, sorted.
    pub actors: BTreeMap<String, ActorStats>,
}

fn rate(count: u64, elapsed_ms: u64) -> f64 {
    if elapsed_ms == 0 {
        return 0.0;
    }
    count as f64 / (elapsed_ms as f64 / 1000.0)
}

impl Stats {
    /// Counters for `name`, if such an actor exists.
    pub fn actor(&self, name: &str) -> Option<&ActorStats> {
        self.actors.get(name)
    }

    /// Messages sent by `name` (0 for unknown names).
    pub fn sent_count(&self, name: &str) -> u64 {
        self.actor(name).map_or(0, |s| s.sent_count)
    }

    /// Messages received by `name` (0 for unknown names).
    pub fn received_count(&self, name: &str) -> u64 {
        self.actor(name).map_or(0, |s| s.received_count)
    }

    /// Messages sent by `name` per virtual second.
    pub fn sent_rate(&self, name: &str) -> f64 {
        rate(self.sent_count(name), self.elapsed_ms)
    }

    /// Messages received by `name` per virtual second.
    pub fn received_rate(&self, name: &str) -> f64 {
        rate(self.received_count(name), self.elapsed_ms)
    }

    /// Sum of all sent counters.
    pub fn total_sent(&self) -> u64 {
        self.actors.values().map(|s| s.sent_count).sum()
    }

    /// Sum of all received counters.
    pub fn total_received(&self) -> u64 {
        self.actors.values().map(|s| s.received_count).sum()
    }

    /// Names of actors that failed.
    pub fn failed_actors(&self) -> Vec<&str> {
        self.actors
            .iter()
            .filter(|(_, s)| s.failure.is_some())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "elapsed: {}ms", self.elapsed_ms)?;
        writeln!(
            f,
            "{:<20} {:>8} {:>10} {:>8} {:>10}",
            "actor", "sent", "sent/s", "recv", "recv/s"
        )?;
        for (name, stats) in &self.actors {
            write!(
                f,
                "{:<20} {:>8} {:>10.2} {:>8} {:>10.2}",
                name,
                stats.sent_count,
                rate(stats.sent_count, self.elapsed_ms),
                stats.received_count,
                rate(stats.received_count, self.elapsed_ms),
            )?;
            if let Some(reason) = &stats.failure {
                write!(f, "  FAILED: {reason}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ── Recorder ──────────────────────────────────────────────────────────

#[derive(Default)]
struct RecorderState {
    actors: BTreeMap<String, ActorStats>,
    // Copy-on-write: snapshots share it until the next send.
    trace: Arc<Vec<TraceEvent>>,
}

/// Thread-safe sink every actor task reports to.
///
/// Counters accumulate monotonically for the whole life of a
/// simulation; the trace is only kept when enabled.
pub struct Recorder {
    tracing: bool,
    state: Mutex<RecorderState>,
}

impl Recorder {
    pub(crate) fn new(tracing: bool) -> Self {
        Recorder {
            tracing,
            state: Mutex::new(RecorderState::default()),
        }
    }

    /// Make `name` show up in stats even if it never sends or receives.
    pub(crate) fn register(&self, name: &str) {
        self.state.lock().actors.entry(name.to_string()).or_default();
    }

    /// Count a message as sent by `from` and trace it.
    ///
    /// Senders that are not registered actors (the driver) are traced
    /// but not counted.
    pub(crate) fn record_send(
        &self,
        at: VirtualTime,
        from: &str,
        to: &str,
        message: &Message,
        kind: TraceKind,
    ) {
        let mut state = self.state.lock();
        if let Some(stats) = state.actors.get_mut(from) {
            stats.sent_count += 1;
        }
        if self.tracing {
            Arc::make_mut(&mut state.trace).push(TraceEvent {
                timestamp: at,
                from: from.to_string(),
                to: to.to_string(),
                message: message.clone(),
                kind,
            });
        }
    }

    pub(crate) fn record_receive(&self, to: &str) {
        let mut state = self.state.lock();
        if let Some(stats) = state.actors.get_mut(to) {
            stats.received_count += 1;
        }
    }

    pub(crate) fn record_failure(&self, actor: &str, reason: &str) {
        let mut state = self.state.lock();
        if let Some(stats) = state.actors.get_mut(actor) {
            stats.failure.get_or_insert_with(|| reason.to_string());
        }
    }

    pub(crate) fn stats(&self, elapsed_ms: u64) -> Stats {
        Stats {
            elapsed_ms,
            actors: self.state.lock().actors.clone(),
        }
    }

    /// The trace so far, or `None` when tracing is off. The returned
    /// trace shares storage with the recorder, so taking one per
    /// condition check does not copy the events.
    pub(crate) fn trace(&self) -> Option<Trace> {
        if !self.tracing {
            return None;
        }
        Some(Trace::shared(Arc::clone(&self.state.lock().trace)))
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Recorder")
            .field("tracing", &self.tracing)
            .field("actors", &state.actors.len())
            .field("trace_len", &state.trace.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_only_registered_actors() {
        let recorder = Recorder::new(false);
        recorder.register("a");
        recorder.register("b");
        let at = VirtualTime::from_millis(5);
        recorder.record_send(at, "a", "b", &Message::atom("x"), TraceKind::Send);
        recorder.record_receive("b");
        recorder.record_send(at, "driver", "b", &Message::atom("y"), TraceKind::Cast);
        recorder.record_receive("b");

        let stats = recorder.stats(1_000);
        assert_eq!(stats.sent_count("a"), 1);
        assert_eq!(stats.received_count("b"), 2);
        assert_eq!(stats.sent_count("driver"), 0);
        assert!(stats.actor("driver").is_none());
        assert!(recorder.trace().is_none());
    }

    #[test]
    fn test_trace_when_enabled() {
        let recorder = Recorder::new(true);
        recorder.register("a");
        recorder.record_send(VirtualTime::ZERO, "a", "a", &Message::Empty, TraceKind::Send);
        let trace = recorder.trace().unwrap();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace.events()[0].from, "a");
    }

    #[test]
    fn test_trace_snapshots_share_events() {
        let recorder = Recorder::new(true);
        recorder.register("a");
        recorder.record_send(VirtualTime::ZERO, "a", "b", &Message::Empty, TraceKind::Send);

        let first = recorder.trace().unwrap();
        let second = recorder.trace().unwrap();
        assert!(std::ptr::eq(first.events(), second.events()));

        // A held snapshot keeps its contents when recording continues.
        let at = VirtualTime::from_millis(1);
        recorder.record_send(at, "a", "b", &Message::Empty, TraceKind::Send);
        assert_eq!(first.len(), 1);
        assert_eq!(recorder.trace().unwrap().len(), 2);
    }

    #[test]
    fn test_rates_zero_when_no_time_elapsed() {
        let recorder = Recorder::new(false);
        recorder.register("a");
        recorder.record_send(VirtualTime::ZERO, "a", "b", &Message::Empty, TraceKind::Send);
        let stats = recorder.stats(0);
        assert_eq!(stats.sent_rate("a"), 0.0);
        assert_eq!(stats.received_rate("a"), 0.0);
        assert!(stats.sent_rate("a").is_finite());
    }

    #[test]
    fn test_rates() {
        let recorder = Recorder::new(false);
        recorder.register("a");
        for _ in 0..10 {
            recorder.record_send(VirtualTime::ZERO, "a", "b", &Message::Empty, TraceKind::Send);
        }
        let stats = recorder.stats(2_000);
        assert_eq!(stats.sent_rate("a"), 5.0);
        assert_eq!(stats.total_sent(), 10);
    }

    #[test]
    fn test_first_failure_wins() {
        let recorder = Recorder::new(false);
        recorder.register("a");
        recorder.record_failure("a", "first");
        recorder.record_failure("a", "second");
        let stats = recorder.stats(0);
        assert_eq!(stats.actor("a").unwrap().failure.as_deref(), Some("first"));
        assert_eq!(stats.failed_actors(), vec!["a"]);
        assert!(stats.to_string().contains("FAILED: first"));
    }
}
