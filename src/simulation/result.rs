//! Run disciplines and what a run hands back.

use std::fmt;

use crate::context::FailureRecord;
use crate::time::VirtualTime;

use super::recorder::Stats;
use super::trace::Trace;

// ── RunMode ───────────────────────────────────────────────────────────

/// Termination predicate evaluated between condition-mode steps.
pub type TerminateWhen = Box<dyn FnMut(&RunSnapshot) -> anyhow::Result<bool> + Send>;

/// The discipline a run is driven under. Exactly one per run.
pub enum RunMode {
    /// Advance once by this many ms.
    Duration(u64),
    /// Advance in `check_interval` steps until `condition` holds or
    /// `max_duration` has elapsed.
    Until {
        max_duration: u64,
        check_interval: Option<u64>,
        condition: TerminateWhen,
    },
    /// Jump from event to event until nothing is pending or
    /// `max_duration` has elapsed.
    Quiescence { max_duration: u64 },
}

impl RunMode {
    /// Fixed-duration run.
    pub fn duration(ms: u64) -> Self {
        RunMode::Duration(ms)
    }

    /// Condition run with an infallible predicate.
    pub fn until<F>(max_duration: u64, mut condition: F) -> Self
    where
        F: FnMut(&RunSnapshot) -> bool + Send + 'static,
    {
        RunMode::Until {
            max_duration,
            check_interval: None,
            condition: Box::new(move |snapshot| Ok(condition(snapshot))),
        }
    }

    /// Condition run with a predicate that may fail; a failure aborts
    /// the run.
    pub fn until_fallible<F>(max_duration: u64, condition: F) -> Self
    where
        F: FnMut(&RunSnapshot) -> anyhow::Result<bool> + Send + 'static,
    {
        RunMode::Until {
            max_duration,
            check_interval: None,
            condition: Box::new(condition),
        }
    }

    /// Quiescence run.
    pub fn quiescence(max_duration: u64) -> Self {
        RunMode::Quiescence { max_duration }
    }

    /// Override the configured check interval. Only affects condition
    /// runs.
    pub fn check_interval(mut self, ms: u64) -> Self {
        if let RunMode::Until { check_interval, .. } = &mut self {
            *check_interval = Some(ms);
        }
        self
    }
}

impl fmt::Debug for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Duration(ms) => f.debug_tuple("Duration").field(ms).finish(),
            RunMode::Until {
                max_duration,
                check_interval,
                ..
            } => f
                .debug_struct("Until")
                .field("max_duration", max_duration)
                .field("check_interval", check_interval)
                .finish_non_exhaustive(),
            RunMode::Quiescence { max_duration } => f
                .debug_struct("Quiescence")
                .field("max_duration", max_duration)
                .finish(),
        }
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────

/// State of a running simulation, as seen by a termination predicate.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub now: VirtualTime,
    /// Virtual ms since the simulation started.
    pub elapsed: u64,
    pub stats: Stats,
    /// `None` unless tracing is enabled.
    pub trace: Option<Trace>,
}

// ── RunResult ─────────────────────────────────────────────────────────

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum TerminationReason {
    /// The termination predicate returned `true`.
    Condition,
    /// No events were left pending.
    Quiescence,
    /// The run used its whole duration.
    MaxTime,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Condition => write!(f, "condition"),
            TerminationReason::Quiescence => write!(f, "quiescence"),
            TerminationReason::MaxTime => write!(f, "max_time"),
        }
    }
}

/// Outcome of [`Simulation::run`](super::Simulation::run).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RunResult {
    /// Virtual ms the run advanced.
    pub actual_duration: u64,
    /// `true` unless the run used its whole duration.
    pub terminated_early: bool,
    pub termination_reason: TerminationReason,
    /// `None` unless tracing is enabled.
    pub trace: Option<Trace>,
    pub stats: Stats,
    /// Actor failures, in the order they happened.
    pub failures: Vec<FailureRecord>,
}

impl RunResult {
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    /// JSON export.
    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_interval_only_applies_to_condition_runs() {
        let mode = RunMode::until(1_000, |_| false).check_interval(10);
        assert!(matches!(
            mode,
            RunMode::Until {
                check_interval: Some(10),
                ..
            }
        ));
        let mode = RunMode::duration(5).check_interval(10);
        assert!(matches!(mode, RunMode::Duration(5)));
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(TerminationReason::MaxTime.to_string(), "max_time");
        assert_eq!(TerminationReason::Quiescence.to_string(), "quiescence");
    }
}
