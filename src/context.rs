//! Explicit ambient binding shared by every actor of one simulation.
//!
//! A [`SimulationContext`] is threaded through actor creation instead of
//! hidden global state. It carries:
//!
//! - the ambient [`TimeBackend`] (if any),
//! - the name → [`ActorRef`] directory used to address actors by name,
//! - the optional message recorder (stats and trace),
//! - the failure log.
//!
//! Backend resolution happens once per actor, at creation, with the
//! priority *explicit per-actor override* > *context backend* > *fresh
//! real-time backend*.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::actor::{ActorId, ActorRef};
use crate::backend::{RealBackend, TimeBackend, VirtualBackend};
use crate::clock::VirtualClock;
use crate::error::{SimError, SimResult};
use crate::simulation::Recorder;
use crate::time::VirtualTime;

// ── ActorOptions ──────────────────────────────────────────────────────

/// Per-actor creation options.
#[derive(Clone, Default)]
pub struct ActorOptions {
    /// Register the actor in the directory under this name.
    pub name: Option<String>,
    /// Explicit backend override; wins over the context binding.
    pub backend: Option<Arc<dyn TimeBackend>>,
}

impl ActorOptions {
    /// Options with no name and no override.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options registering the actor under `name`.
    pub fn named(name: impl Into<String>) -> Self {
        ActorOptions {
            name: Some(name.into()),
            backend: None,
        }
    }

    /// Set the directory name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the backend for this actor only.
    pub fn backend(mut self, backend: Arc<dyn TimeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }
}

impl fmt::Debug for ActorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorOptions")
            .field("name", &self.name)
            .field("backend", &self.backend.as_ref().map(|b| b.kind()))
            .finish()
    }
}

// ── FailureRecord ─────────────────────────────────────────────────────

/// An actor that terminated because one of its hooks failed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FailureRecord {
    /// Actor name.
    pub actor: String,
    /// Error or panic message.
    pub reason: String,
    /// Backend time at which the failure happened.
    pub at: VirtualTime,
}

// ── Directory ─────────────────────────────────────────────────────────

/// Name → handle indirection table. Actors address each other through
/// it and never hold each other directly.
#[derive(Default)]
pub(crate) struct Directory {
    actors: RwLock<BTreeMap<String, ActorRef>>,
}

impl Directory {
    pub(crate) fn register(&self, name: &str, actor: ActorRef) -> SimResult<()> {
        let mut actors = self.actors.write();
        if actors.contains_key(name) {
            return Err(SimError::DuplicateActor(name.to_string()));
        }
        actors.insert(name.to_string(), actor);
        Ok(())
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<ActorRef> {
        self.actors.read().get(name).cloned()
    }

    pub(crate) fn clear(&self) {
        self.actors.write().clear();
    }
}

// ── SimulationContext ─────────────────────────────────────────────────

/// Shared, test-scoped binding handed to every actor created through it.
#[derive(Clone, Default)]
pub struct SimulationContext {
    backend: Option<Arc<dyn TimeBackend>>,
    directory: Arc<Directory>,
    recorder: Option<Arc<Recorder>>,
    failures: Arc<Mutex<Vec<FailureRecord>>>,
    ids: Arc<AtomicU64>,
}

impl SimulationContext {
    /// A context with no ambient backend: actors default to real time.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose actors run on `clock` unless overridden.
    pub fn with_clock(clock: VirtualClock) -> Self {
        Self::with_backend(Arc::new(VirtualBackend::new(clock)))
    }

    /// A context whose actors use `backend` unless overridden.
    pub fn with_backend(backend: Arc<dyn TimeBackend>) -> Self {
        SimulationContext {
            backend: Some(backend),
            ..Self::default()
        }
    }

    pub(crate) fn with_recorder(mut self, recorder: Arc<Recorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Same directory, recorder and failure log, different ambient
    /// backend. Used to let children inherit their parent's binding.
    pub(crate) fn rebind(&self, backend: Arc<dyn TimeBackend>) -> Self {
        SimulationContext {
            backend: Some(backend),
            ..self.clone()
        }
    }

    /// The ambient backend, if one is bound.
    pub fn backend(&self) -> Option<&Arc<dyn TimeBackend>> {
        self.backend.as_ref()
    }

    /// Resolve the backend for a new actor.
    pub fn resolve(&self, options: &ActorOptions) -> Arc<dyn TimeBackend> {
        if let Some(backend) = &options.backend {
            return backend.clone();
        }
        if let Some(backend) = &self.backend {
            return backend.clone();
        }
        Arc::new(RealBackend::new())
    }

    /// Find a registered actor by name.
    pub fn lookup(&self, name: &str) -> Option<ActorRef> {
        self.directory.lookup(name)
    }

    /// Failures recorded so far, in the order they happened.
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failures.lock().clone()
    }

    pub(crate) fn failure_count(&self) -> usize {
        self.failures.lock().len()
    }

    pub(crate) fn record_failure(&self, record: FailureRecord) {
        if let Some(recorder) = &self.recorder {
            recorder.record_failure(&record.actor, &record.reason);
        }
        self.failures.lock().push(record);
    }

    pub(crate) fn directory(&self) -> &Directory {
        &self.directory
    }

    pub(crate) fn recorder(&self) -> Option<&Arc<Recorder>> {
        self.recorder.as_ref()
    }

    pub(crate) fn next_actor_id(&self) -> ActorId {
        ActorId::new(self.ids.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Debug for SimulationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationContext")
            .field("backend", &self.backend.as_ref().map(|b| b.kind()))
            .field("recording", &self.recorder.is_some())
            .field("failures", &self.failure_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;

    #[test]
    fn test_default_resolves_to_real() {
        let ctx = SimulationContext::new();
        assert_eq!(ctx.resolve(&ActorOptions::new()).kind(), BackendKind::Real);
    }

    #[test]
    fn test_context_binding_wins_over_default() {
        let ctx = SimulationContext::with_clock(VirtualClock::new());
        assert_eq!(ctx.resolve(&ActorOptions::new()).kind(), BackendKind::Virtual);
    }

    #[test]
    fn test_override_wins_over_context() {
        let ctx = SimulationContext::with_clock(VirtualClock::new());
        let options = ActorOptions::new().backend(Arc::new(RealBackend::new()));
        assert_eq!(ctx.resolve(&options).kind(), BackendKind::Real);
    }

    #[test]
    fn test_rebind_shares_failure_log() {
        let ctx = SimulationContext::new();
        let child = ctx.rebind(Arc::new(VirtualBackend::new(VirtualClock::new())));
        child.record_failure(FailureRecord {
            actor: "a".into(),
            reason: "boom".into(),
            at: VirtualTime::ZERO,
        });
        assert_eq!(ctx.failures().len(), 1);
        assert_eq!(child.backend().map(|b| b.kind()), Some(BackendKind::Virtual));
    }
}
