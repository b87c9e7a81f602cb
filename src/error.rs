//! Structured error types for timewarp.
//!
//! All fallible public APIs return `Result<T, SimError>`. Configuration
//! and scheduling errors surface synchronously to the caller; actor
//! execution failures are isolated and reported through the run result
//! unless the failure policy asks for the run to abort.

use thiserror::Error;

/// The top-level error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    // ── Configuration errors ──────────────────────────────

    /// Two actors were registered under the same name.
    #[error("actor `{0}` is already defined")]
    DuplicateActor(String),

    /// An actor lists a target that is not defined in the simulation.
    #[error("actor `{actor}` targets unknown actor `{target}`")]
    UnknownTarget { actor: String, target: String },

    /// A name was referenced but no actor is registered under it.
    #[error("no actor named `{0}`")]
    UnknownActor(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Scheduling errors ─────────────────────────────────

    /// Attempted to schedule or advance to a time in the past.
    #[error("cannot schedule at T={requested} when current time is T={current}")]
    NonCausalEvent { requested: u64, current: u64 },

    /// Virtual time would overflow `u64` milliseconds.
    #[error("virtual time overflow")]
    TimeOverflow,

    /// The clock backing this request has been shut down.
    #[error("clock has been shut down")]
    ClockStopped,

    /// A real-time timer was requested outside of a tokio runtime.
    #[error("no tokio runtime available for real-time timers")]
    NoRuntime,

    // ── Actor execution errors ────────────────────────────

    /// `on_start` refused to start the actor.
    #[error("actor `{actor}` rejected start: {reason}")]
    StartRejected { actor: String, reason: String },

    /// The actor has terminated and no longer accepts messages.
    #[error("actor `{0}` is not running")]
    ActorNotRunning(String),

    /// A synchronous request was handled without producing a reply.
    #[error("actor `{0}` did not reply")]
    NoReply(String),

    /// A synchronous request was not answered within the (real) timeout.
    #[error("call to `{actor}` timed out after {timeout_ms}ms")]
    CallTimeout { actor: String, timeout_ms: u64 },

    /// An actor hook failed and the failure policy aborts the run.
    #[error("actor `{actor}` failed: {reason}")]
    ActorFailed { actor: String, reason: String },

    // ── Run errors ────────────────────────────────────────

    /// The termination predicate itself failed.
    #[error("termination condition failed: {0}")]
    TerminationCondition(String),

    /// The simulation was driven from a runtime whose scheduling order
    /// is not reproducible.
    #[error("simulation needs a current-thread tokio runtime, found {0}")]
    UnsupportedRuntime(String),

    /// The simulation was already stopped.
    #[error("simulation has been stopped")]
    SimulationStopped,
}

impl SimError {
    /// Returns `true` for errors caused by how the simulation was set up.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SimError::DuplicateActor(_)
                | SimError::UnknownTarget { .. }
                | SimError::UnknownActor(_)
                | SimError::InvalidConfig(_)
        )
    }
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unknown_target() {
        let e = SimError::UnknownTarget {
            actor: "producer".into(),
            target: "ghost".into(),
        };
        assert_eq!(e.to_string(), "actor `producer` targets unknown actor `ghost`");
    }

    #[test]
    fn test_error_display_non_causal() {
        let e = SimError::NonCausalEvent { requested: 3, current: 10 };
        assert!(e.to_string().contains("T=3"));
        assert!(e.to_string().contains("T=10"));
    }

    #[test]
    fn test_error_display_unsupported_runtime() {
        let e = SimError::UnsupportedRuntime("MultiThread".into());
        assert!(e.to_string().contains("current-thread"));
    }

    #[test]
    fn test_config_classification() {
        assert!(SimError::DuplicateActor("a".into()).is_config_error());
        assert!(!SimError::ClockStopped.is_config_error());
    }

    #[test]
    fn test_error_is_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(SimError::TimeOverflow);
        assert!(!e.to_string().is_empty());
    }
}
