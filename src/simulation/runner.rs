//! `Simulation` — builds named actors on one virtual clock and drives
//! them under a run discipline.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::actor::handle::Envelope;
use crate::actor::runtime::{prepare, PendingActor};
use crate::actor::{Actor, ActorRef, StopReason};
use crate::clock::VirtualClock;
use crate::config::{FailurePolicy, SimulationConfig};
use crate::context::{ActorOptions, FailureRecord, SimulationContext};
use crate::error::{SimError, SimResult};
use crate::message::Message;
use crate::time::VirtualTime;

use super::definition::ActorDefinition;
use super::recorder::{Recorder, Stats};
use super::result::{RunMode, RunResult, RunSnapshot, TerminateWhen, TerminationReason};
use super::simulated::SimulatedActor;
use super::trace::TraceKind;

/// Sender name recorded for messages injected by the driver.
pub const DRIVER: &str = "driver";

type Launch = Box<dyn FnOnce(PendingActor) -> oneshot::Receiver<SimResult<()>> + Send>;

/// One actor waiting for the simulation to start.
struct Entry {
    name: String,
    targets: Vec<String>,
    options: ActorOptions,
    launch: Launch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Building,
    Running,
    Stopped,
}

/// A set of named actors sharing one virtual clock.
///
/// # Runtime
///
/// A simulation must be driven from a current-thread tokio runtime
/// (`#[tokio::test]`, `#[tokio::main(flavor = "current_thread")]`). On a
/// multi-thread runtime the actors reacting to one timestamp race each
/// other, so traces would differ between runs; `start` rejects it.
///
/// # Example
/// ```rust
/// use timewarp::simulation::{ActorDef, RunMode, SendPattern, Simulation};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), timewarp::SimError> {
/// let result = Simulation::new(true)
///     .add_actor(
///         ActorDef::new("producer")
///             .send_pattern(SendPattern::periodic(100, "data"))
///             .targets(["consumer"]),
///     )?
///     .add_actor(ActorDef::new("consumer"))?
///     .run(RunMode::duration(1_000))
///     .await?;
///
/// assert_eq!(result.stats().sent_count("producer"), 10);
/// assert_eq!(result.stats().received_count("consumer"), 10);
/// # Ok(())
/// # }
/// ```
pub struct Simulation {
    config: SimulationConfig,
    clock: VirtualClock,
    context: SimulationContext,
    recorder: Arc<Recorder>,
    entries: Vec<Entry>,
    names: HashSet<String>,
    actors: Vec<ActorRef>,
    phase: Phase,
    origin: VirtualTime,
}

impl Simulation {
    /// A simulation with default configuration.
    pub fn new(trace: bool) -> Self {
        Self::build(SimulationConfig::default().with_trace(trace))
    }

    /// A simulation with explicit configuration.
    pub fn with_config(config: SimulationConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SimulationConfig) -> Self {
        let clock = VirtualClock::new();
        let recorder = Arc::new(Recorder::new(config.trace));
        let context = SimulationContext::with_clock(clock.clone()).with_recorder(recorder.clone());
        Simulation {
            config,
            origin: clock.now(),
            clock,
            context,
            recorder,
            entries: Vec::new(),
            names: HashSet::new(),
            actors: Vec::new(),
            phase: Phase::Building,
        }
    }

    // ── Building ──────────────────────────────────────────────

    /// Add a declarative actor.
    pub fn add_actor(self, def: impl Into<ActorDefinition>) -> SimResult<Self> {
        let def = def.into();
        if let Some(pattern) = &def.pattern {
            pattern.validate(&def.name)?;
        }
        let options = ActorOptions {
            name: Some(def.name.clone()),
            backend: def.backend.clone(),
        };
        let name = def.name.clone();
        let targets = def.targets.clone();
        self.push(
            name,
            targets,
            options,
            Box::new(move |pending: PendingActor| pending.launch::<SimulatedActor>(def)),
        )
    }

    /// Add a hand-written actor that runs alongside the simulated ones.
    pub fn add_external_actor<A: Actor>(
        self,
        name: impl Into<String>,
        args: A::Args,
    ) -> SimResult<Self> {
        self.add_external_actor_with::<A>(args, ActorOptions::named(name))
    }

    /// Like [`add_external_actor`](Self::add_external_actor), with
    /// explicit options. `options.name` is required.
    pub fn add_external_actor_with<A: Actor>(
        self,
        args: A::Args,
        options: ActorOptions,
    ) -> SimResult<Self> {
        let Some(name) = options.name.clone() else {
            return Err(SimError::InvalidConfig("external actor needs a name".into()));
        };
        self.push(
            name,
            Vec::new(),
            options,
            Box::new(move |pending: PendingActor| pending.launch::<A>(args)),
        )
    }

    fn push(
        mut self,
        name: String,
        targets: Vec<String>,
        options: ActorOptions,
        launch: Launch,
    ) -> SimResult<Self> {
        if self.phase != Phase::Building {
            return Err(SimError::InvalidConfig(format!(
                "cannot add `{name}` after the simulation started"
            )));
        }
        if !self.names.insert(name.clone()) {
            return Err(SimError::DuplicateActor(name));
        }
        self.entries.push(Entry {
            name,
            targets,
            options,
            launch,
        });
        Ok(self)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Register every actor, then start them in declaration order.
    ///
    /// Unknown targets are reported before any actor starts. Calling
    /// `start` on a running simulation is a no-op.
    ///
    /// Fails with [`SimError::UnsupportedRuntime`] unless called on a
    /// current-thread tokio runtime.
    pub async fn start(&mut self) -> SimResult<()> {
        match self.phase {
            Phase::Running => return Ok(()),
            Phase::Stopped => return Err(SimError::SimulationStopped),
            Phase::Building => {}
        }
        check_runtime()?;
        for entry in &self.entries {
            if let Some(target) = entry.targets.iter().find(|t| !self.names.contains(*t)) {
                return Err(SimError::UnknownTarget {
                    actor: entry.name.clone(),
                    target: target.clone(),
                });
            }
        }

        let entries = std::mem::take(&mut self.entries);
        let mut prepared = Vec::with_capacity(entries.len());
        for entry in entries {
            self.recorder.register(&entry.name);
            let pending = prepare(&self.context, &entry.options)?;
            self.actors.push(pending.actor_ref().clone());
            prepared.push((pending, entry.launch));
        }
        self.phase = Phase::Running;

        let mut prepared = prepared.into_iter();
        while let Some((pending, launch)) = prepared.next() {
            let name = pending.actor_ref().name().to_string();
            let started = match launch(pending).await {
                Ok(started) => started,
                Err(_) => Err(SimError::ActorNotRunning(name)),
            };
            if let Err(err) = started {
                for (pending, _) in prepared {
                    pending.abandon();
                }
                self.shutdown().await;
                return Err(err);
            }
        }
        self.settle().await;
        info!(actors = self.actors.len(), "simulation started");
        Ok(())
    }

    /// Advance the clock by `ms`, letting every actor react.
    pub async fn advance(&mut self, ms: u64) -> SimResult<()> {
        self.start().await?;
        self.clock.advance(ms).await?;
        self.check_failures()
    }

    /// Inject a fire-and-forget message from the driver.
    pub async fn cast(&mut self, to: &str, message: impl Into<Message>) -> SimResult<()> {
        self.start().await?;
        let target = self.lookup(to)?;
        let message = message.into();
        self.recorder
            .record_send(self.clock.now(), DRIVER, to, &message, TraceKind::Cast);
        target.post(Envelope::Message {
            from: Some(DRIVER.to_string()),
            message,
            kind: TraceKind::Cast,
        })?;
        self.settle().await;
        self.check_failures()
    }

    /// Send a synchronous request from the driver and wait for the reply.
    ///
    /// The wait is bounded by `call_timeout` in real time.
    pub async fn call(&mut self, to: &str, message: impl Into<Message>) -> SimResult<Message> {
        self.start().await?;
        let target = self.lookup(to)?;
        let message = message.into();
        self.recorder
            .record_send(self.clock.now(), DRIVER, to, &message, TraceKind::Call);
        let reply = target
            .call_from(Some(DRIVER.to_string()), message, self.config.call_timeout)
            .await;
        self.settle().await;
        self.check_failures()?;
        reply
    }

    /// Stats and trace as of now.
    pub fn snapshot(&self) -> RunSnapshot {
        let elapsed = self.clock.now().saturating_since(self.origin);
        RunSnapshot {
            now: self.clock.now(),
            elapsed,
            stats: self.recorder.stats(elapsed),
            trace: self.recorder.trace(),
        }
    }

    /// Stop every actor and tear the clock down. Returns the final stats.
    pub async fn stop(mut self) -> Stats {
        self.shutdown().await;
        self.snapshot().stats
    }

    /// Drive the simulation under `mode`, then stop it.
    pub async fn run(mut self, mode: RunMode) -> SimResult<RunResult> {
        self.start().await?;
        let begin = self.clock.now();
        info!(?mode, at = %begin, "run started");
        let outcome = self.drive(mode, begin).await;
        self.shutdown().await;
        let reason = outcome?;

        let snapshot = self.snapshot();
        let failures = self.context.failures();
        let actual_duration = snapshot.now.saturating_since(begin);
        if failures.is_empty() {
            info!(%reason, actual_duration, "run finished");
        } else {
            warn!(
                %reason,
                actual_duration,
                failures = failures.len(),
                "run finished with failures"
            );
        }
        Ok(RunResult {
            actual_duration,
            terminated_early: reason != TerminationReason::MaxTime,
            termination_reason: reason,
            trace: snapshot.trace,
            stats: snapshot.stats,
            failures,
        })
    }

    // ── Accessors ─────────────────────────────────────────────

    /// The simulation's clock.
    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    /// Current virtual time.
    pub fn now(&self) -> VirtualTime {
        self.clock.now()
    }

    /// The binding actors of this simulation are created through.
    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    /// Handle to a started actor.
    pub fn actor(&self, name: &str) -> Option<ActorRef> {
        self.context.lookup(name)
    }

    /// Failures so far.
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.context.failures()
    }

    // ── Driving ───────────────────────────────────────────────

    async fn drive(&mut self, mode: RunMode, begin: VirtualTime) -> SimResult<TerminationReason> {
        match mode {
            RunMode::Duration(ms) => {
                self.clock.advance(ms).await?;
                self.check_failures()?;
                Ok(TerminationReason::MaxTime)
            }
            RunMode::Until {
                max_duration,
                check_interval,
                mut condition,
            } => {
                let step = check_interval.unwrap_or(self.config.check_interval);
                if step == 0 {
                    return Err(SimError::InvalidConfig("check_interval must be > 0".into()));
                }
                let deadline = begin.plus(max_duration).ok_or(SimError::TimeOverflow)?;
                loop {
                    let remaining = deadline.saturating_since(self.clock.now());
                    if remaining == 0 {
                        return Ok(TerminationReason::MaxTime);
                    }
                    self.clock.advance(step.min(remaining)).await?;
                    self.check_failures()?;
                    if self.evaluate(&mut condition)? {
                        return Ok(TerminationReason::Condition);
                    }
                }
            }
            RunMode::Quiescence { max_duration } => {
                let deadline = begin.plus(max_duration).ok_or(SimError::TimeOverflow)?;
                loop {
                    if self.clock.pending_count() == 0 {
                        return Ok(TerminationReason::Quiescence);
                    }
                    let now = self.clock.now();
                    if now >= deadline {
                        return Ok(TerminationReason::MaxTime);
                    }
                    match self.clock.next_due() {
                        Some(due) if due <= deadline => {
                            self.clock.advance_to_next().await?;
                            self.check_failures()?;
                        }
                        _ => {
                            self.clock.advance_to(deadline).await?;
                            self.check_failures()?;
                            return Ok(TerminationReason::MaxTime);
                        }
                    }
                }
            }
        }
    }

    /// Run the termination predicate on a fresh snapshot. Errors and
    /// panics both abort the run.
    fn evaluate(&self, condition: &mut TerminateWhen) -> SimResult<bool> {
        let snapshot = self.snapshot();
        match panic::catch_unwind(AssertUnwindSafe(|| condition(&snapshot))) {
            Ok(Ok(done)) => Ok(done),
            Ok(Err(err)) => Err(SimError::TerminationCondition(format!("{err:#}"))),
            Err(_) => Err(SimError::TerminationCondition("predicate panicked".into())),
        }
    }

    fn check_failures(&self) -> SimResult<()> {
        if self.config.failure_policy == FailurePolicy::Continue {
            return Ok(());
        }
        match self.context.failures().into_iter().next() {
            Some(first) => Err(SimError::ActorFailed {
                actor: first.actor,
                reason: first.reason,
            }),
            None => Ok(()),
        }
    }

    fn lookup(&self, name: &str) -> SimResult<ActorRef> {
        self.context
            .lookup(name)
            .ok_or_else(|| SimError::UnknownActor(name.to_string()))
    }

    async fn settle(&self) {
        tokio::task::yield_now().await;
        self.clock.activity().settled().await;
    }

    async fn shutdown(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        self.phase = Phase::Stopped;
        // Stop in reverse start order so consumers outlive producers.
        for actor in self.actors.iter().rev() {
            if actor.is_alive() {
                let exit = actor.stop(StopReason::Shutdown).await;
                debug!(actor = %actor.name(), %exit, "actor stopped");
            }
        }
        self.clock.shutdown();
        self.context.directory().clear();
    }
}

/// Actor tasks woken by one timestamp batch must run in wake order,
/// which only a current-thread scheduler guarantees.
fn check_runtime() -> SimResult<()> {
    let runtime = Handle::try_current().map_err(|_| SimError::NoRuntime)?;
    match runtime.runtime_flavor() {
        RuntimeFlavor::CurrentThread => Ok(()),
        other => Err(SimError::UnsupportedRuntime(format!("{other:?}"))),
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if self.phase == Phase::Running {
            for actor in &self.actors {
                let _ = actor.request_stop(StopReason::Shutdown);
            }
            self.clock.shutdown();
        }
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("phase", &self.phase)
            .field("now", &self.clock.now())
            .field("actors", &self.names.len())
            .field("config", &self.config)
            .finish()
    }
}
