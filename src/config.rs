//! Configuration types for a simulation run.

use std::time::Duration;

use crate::error::{SimError, SimResult};

/// What the run does when an actor hook fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure and keep running the other actors.
    #[default]
    Continue,
    /// Stop the run after the advance step in which the failure was seen
    /// and return [`SimError::ActorFailed`].
    Abort,
}

/// Simulation configuration.
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    /// Record every inter-actor message in the trace.
    pub trace: bool,

    /// Default virtual-time step between termination-condition checks, ms.
    pub check_interval: u64,

    /// Reaction to actor failures.
    pub failure_policy: FailurePolicy,

    /// Wait limit for synchronous calls.
    ///
    /// Measured in real time even when the callee runs on a virtual
    /// clock.
    pub call_timeout: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            trace: false,
            check_interval: 100,
            failure_policy: FailurePolicy::Continue,
            call_timeout: Duration::from_secs(5),
        }
    }
}

impl SimulationConfig {
    /// Enable or disable tracing.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Set the default condition-check interval.
    pub fn with_check_interval(mut self, check_interval: u64) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Set the synchronous-call timeout.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Validate the configuration.
    ///
    /// # Checks
    ///
    /// - `check_interval` is non-zero
    /// - `call_timeout` is non-zero
    pub fn validate(&self) -> SimResult<()> {
        if self.check_interval == 0 {
            return Err(SimError::InvalidConfig(
                "check_interval must be > 0".into(),
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(SimError::InvalidConfig("call_timeout must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::default();
        assert!(!config.trace);
        assert_eq!(config.check_interval, 100);
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SimulationConfig::default()
            .with_trace(true)
            .with_check_interval(10)
            .with_failure_policy(FailurePolicy::Abort)
            .with_call_timeout(Duration::from_millis(250));
        assert!(config.trace);
        assert_eq!(config.check_interval, 10);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let err = SimulationConfig::default()
            .with_check_interval(0)
            .validate()
            .unwrap_err();
        assert!(err.is_config_error());

        assert!(SimulationConfig::default()
            .with_call_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
