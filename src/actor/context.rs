//! `Context` — what an actor hook can do besides mutating its own state.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::backend::TimeBackend;
use crate::context::{ActorOptions, SimulationContext};
use crate::error::{SimError, SimResult};
use crate::event::TimerId;
use crate::message::Message;
use crate::simulation::TraceKind;
use crate::time::VirtualTime;

use super::handle::{ActorRef, Envelope};
use super::runtime::prepare;
use super::traits::{Actor, StopReason};

/// Per-actor view of the simulation, handed to every hook.
///
/// All time-dependent operations route through the actor's bound
/// backend, so the same actor code runs unchanged on real or virtual
/// time.
pub struct Context {
    myself: ActorRef,
    backend: Arc<dyn TimeBackend>,
    sim: SimulationContext,
    /// Own timers that have neither fired nor been cancelled.
    timers: HashSet<TimerId>,
    pub(crate) deferred: VecDeque<Message>,
    sender: Option<String>,
    stop: Option<StopReason>,
}

impl Context {
    pub(crate) fn new(
        myself: ActorRef,
        backend: Arc<dyn TimeBackend>,
        sim: SimulationContext,
    ) -> Self {
        Context {
            myself,
            backend,
            sim,
            timers: HashSet::new(),
            deferred: VecDeque::new(),
            sender: None,
            stop: None,
        }
    }

    /// Current time of the bound backend.
    pub fn now(&self) -> VirtualTime {
        self.backend.now()
    }

    /// Handle to this actor.
    pub fn myself(&self) -> &ActorRef {
        &self.myself
    }

    /// This actor's name.
    pub fn name(&self) -> &str {
        self.myself.name()
    }

    /// The backend this actor was bound to at creation.
    pub fn backend(&self) -> &Arc<dyn TimeBackend> {
        &self.backend
    }

    /// The binding this actor was created through.
    pub fn simulation(&self) -> &SimulationContext {
        &self.sim
    }

    /// Who sent the message being handled, if known.
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    // ── Time ──────────────────────────────────────────────────────────

    /// Deliver `message` to this actor after `delay` ms of backend time.
    /// It arrives through `on_timer_message`.
    pub fn send_after(&mut self, message: impl Into<Message>, delay: u64) -> SimResult<TimerId> {
        let id = self.backend.schedule_message(
            Arc::new(self.myself.clone()),
            message.into(),
            delay,
        )?;
        self.timers.insert(id);
        Ok(id)
    }

    /// Deliver `message` to `target` after `delay` ms of this actor's
    /// backend time.
    pub fn send_after_to(
        &mut self,
        target: &ActorRef,
        message: impl Into<Message>,
        delay: u64,
    ) -> SimResult<TimerId> {
        self.backend
            .schedule_message(Arc::new(target.clone()), message.into(), delay)
    }

    /// Cancel a pending timer. Unknown or fired handles are a no-op.
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id);
        self.backend.cancel(id)
    }

    /// Number of own timers still pending.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Forget a fired timer. Returns `false` if it was scheduled by
    /// another actor.
    pub(crate) fn timer_fired(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id)
    }

    pub(crate) fn cancel_all_timers(&mut self) {
        for id in self.timers.drain() {
            self.backend.cancel(id);
        }
    }

    // ── Messaging ─────────────────────────────────────────────────────

    /// Resolve a name through the directory.
    pub fn lookup(&self, name: &str) -> SimResult<ActorRef> {
        self.sim
            .lookup(name)
            .ok_or_else(|| SimError::UnknownActor(name.to_string()))
    }

    /// Send `message` to the actor registered as `to`, recorded as a
    /// send.
    pub fn send(&mut self, to: &str, message: impl Into<Message>) -> SimResult<()> {
        self.deliver(to, message.into(), TraceKind::Send)
    }

    /// Like [`send`](Self::send), recorded as a cast.
    pub fn cast(&mut self, to: &str, message: impl Into<Message>) -> SimResult<()> {
        self.deliver(to, message.into(), TraceKind::Cast)
    }

    fn deliver(&mut self, to: &str, message: Message, kind: TraceKind) -> SimResult<()> {
        let target = self.lookup(to)?;
        if let Some(recorder) = self.sim.recorder() {
            recorder.record_send(self.now(), self.name(), to, &message, kind);
        }
        trace!(from = %self.name(), %to, %message, "send");
        let posted = target.post(Envelope::Message {
            from: Some(self.name().to_string()),
            message,
            kind,
        });
        // A terminated receiver loses the message; the sender carries on.
        if let Err(SimError::ActorNotRunning(_)) = posted {
            debug!(from = %self.name(), %to, "receiver has terminated, message dropped");
            return Ok(());
        }
        posted
    }

    /// Record a message this actor delivers to itself outside the
    /// mailbox, so it shows up in stats and trace like a real send.
    pub(crate) fn record_self_delivery(&self, message: &Message) {
        if let Some(recorder) = self.sim.recorder() {
            recorder.record_send(self.now(), self.name(), self.name(), message, TraceKind::Send);
            recorder.record_receive(self.name());
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────

    /// Queue a deferred action to run before the next mailbox message.
    pub fn defer(&mut self, tag: impl Into<Message>) {
        self.deferred.push_back(tag.into());
    }

    /// Stop this actor once the current hook returns.
    pub fn stop(&mut self, reason: StopReason) {
        self.stop = Some(reason);
    }

    pub(crate) fn take_stop(&mut self) -> Option<StopReason> {
        self.stop.take()
    }

    pub(crate) fn set_sender(&mut self, sender: Option<String>) {
        self.sender = sender;
    }

    /// Start a child actor. Without an explicit backend in `options`,
    /// the child inherits this actor's backend.
    ///
    /// The child starts asynchronously; a rejected start is recorded as
    /// a failure of the child.
    pub fn spawn_child<A: Actor>(
        &mut self,
        args: A::Args,
        options: ActorOptions,
    ) -> SimResult<ActorRef> {
        let binding = self.sim.rebind(self.backend.clone());
        let pending = prepare(&binding, &options)?;
        let child = pending.actor_ref().clone();
        drop(pending.launch::<A>(args));
        Ok(child)
    }
}
