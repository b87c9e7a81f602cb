//! The actor task: start, mailbox loop, termination.
//!
//! ```text
//! prepare ──▶ launch ──▶ on_start ──▶ deferred* ──▶ ┌─ recv ◀──────┐
//!                                                  │  hook        │
//!                                                  │  deferred*   │
//!                                                  └─ end unit ───┘
//! ```
//!
//! Every mailbox entry is one unit of [`Activity`](crate::clock::Activity)
//! on the bound clock. A unit ends only after its hook *and* every
//! deferred action it chained have run, so a virtual clock never moves
//! past a timestamp while an actor is still reacting to it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::backend::TimeBackend;
use crate::context::{ActorOptions, FailureRecord, SimulationContext};
use crate::error::{SimError, SimResult};

use super::context::Context;
use super::handle::{ActorRef, Envelope};
use super::traits::{Actor, ActorStatus, ExitReason, StopReason};

// ── Creation ──────────────────────────────────────────────────────────

/// An actor whose handle and mailbox exist but whose task has not been
/// spawned. Lets a group of actors be registered before any of them
/// starts, so start hooks can address each other by name.
pub(crate) struct PendingActor {
    actor: ActorRef,
    rx: mpsc::UnboundedReceiver<Envelope>,
    backend: Arc<dyn TimeBackend>,
    sim: SimulationContext,
}

/// Resolve the backend, mint the handle, and register the name.
pub(crate) fn prepare(sim: &SimulationContext, options: &ActorOptions) -> SimResult<PendingActor> {
    let id = sim.next_actor_id();
    let backend = sim.resolve(options);
    let name = options
        .name
        .clone()
        .unwrap_or_else(|| format!("actor-{}", id.raw()));
    let (actor, rx) = ActorRef::new(id, name, backend.activity());
    if options.name.is_some() {
        sim.directory().register(actor.name(), actor.clone())?;
    }
    Ok(PendingActor {
        actor,
        rx,
        backend,
        sim: sim.clone(),
    })
}

impl PendingActor {
    pub(crate) fn actor_ref(&self) -> &ActorRef {
        &self.actor
    }

    /// Spawn the actor task. The receiver resolves once `on_start` has
    /// returned.
    pub(crate) fn launch<A: Actor>(self, args: A::Args) -> oneshot::Receiver<SimResult<()>> {
        let (ack, started) = oneshot::channel();
        // The start itself is a unit of activity.
        self.actor.begin_activity();
        tokio::spawn(run::<A>(self, args, ack));
        started
    }

    /// Give up on an actor that will never be launched.
    pub(crate) fn abandon(self) {
        self.actor.finish(ExitReason::Stopped(StopReason::Shutdown));
    }
}

/// Create and start an actor through `sim`, waiting for `on_start`.
///
/// The backend is resolved once, here: `options.backend`, else the
/// context's backend, else a fresh real-time backend.
pub async fn spawn_actor<A: Actor>(
    sim: &SimulationContext,
    args: A::Args,
    options: ActorOptions,
) -> SimResult<ActorRef> {
    let pending = prepare(sim, &options)?;
    let actor = pending.actor_ref().clone();
    match pending.launch::<A>(args).await {
        Ok(started) => started.map(|()| actor),
        Err(_) => Err(SimError::ActorNotRunning(actor.name().to_string())),
    }
}

// ── Task ──────────────────────────────────────────────────────────────

/// How a running actor ends.
enum Ending {
    Stop(StopReason),
    Fail(String),
}

async fn run<A: Actor>(pending: PendingActor, args: A::Args, ack: oneshot::Sender<SimResult<()>>) {
    let PendingActor {
        actor: me,
        mut rx,
        backend,
        sim,
    } = pending;
    let mut ctx = Context::new(me.clone(), backend, sim);

    let mut actor = match guard(|| A::on_start(args, &mut ctx)) {
        Ok(started) => {
            ctx.deferred.extend(started.continuation);
            started.actor
        }
        Err(reason) => {
            warn!(actor = %me.name(), %reason, "start rejected");
            ctx.cancel_all_timers();
            me.finish(ExitReason::Rejected(reason.clone()));
            close_mailbox(&me, &mut rx);
            let rejected = SimError::StartRejected {
                actor: me.name().to_string(),
                reason: reason.clone(),
            };
            // Nobody is waiting for the ack: report it like any failure.
            if ack.send(Err(rejected)).is_err() {
                ctx.simulation().record_failure(FailureRecord {
                    actor: me.name().to_string(),
                    reason,
                    at: ctx.now(),
                });
            }
            me.end_activity();
            return;
        }
    };
    me.set_status(ActorStatus::Running);
    debug!(actor = %me.name(), id = %me.id(), "started");
    let _ = ack.send(Ok(()));

    let mut ending = follow_up(&mut actor, &mut ctx, Ok(()));
    loop {
        if let Some(ending) = ending.take() {
            terminate(&mut actor, &mut ctx, &mut rx, ending);
            me.end_activity();
            break;
        }
        me.end_activity();
        let Some(envelope) = rx.recv().await else {
            terminate(&mut actor, &mut ctx, &mut rx, Ending::Stop(StopReason::Normal));
            break;
        };
        ending = handle(&mut actor, &mut ctx, envelope);
    }
}

fn handle<A: Actor>(actor: &mut A, ctx: &mut Context, envelope: Envelope) -> Option<Ending> {
    let outcome = match envelope {
        Envelope::Message {
            from,
            message,
            kind,
        } => {
            trace!(actor = %ctx.name(), ?kind, %message, "message");
            record_receive(ctx);
            ctx.set_sender(from);
            guard(|| actor.on_async_message(message, ctx))
        }
        Envelope::Call {
            from,
            message,
            reply,
        } => {
            trace!(actor = %ctx.name(), %message, "call");
            record_receive(ctx);
            ctx.set_sender(from);
            guard(|| actor.on_sync_request(message, ctx)).map(move |answer| {
                if let Some(answer) = answer {
                    let _ = reply.send(answer);
                }
            })
        }
        Envelope::Timer { id, message } => {
            ctx.set_sender(None);
            if ctx.timer_fired(id) {
                guard(|| actor.on_timer_message(message, ctx))
            } else {
                guard(|| actor.on_async_message(message, ctx))
            }
        }
        Envelope::Upgrade(from_version) => {
            ctx.set_sender(None);
            guard(|| actor.on_state_upgrade(from_version, ctx))
        }
        Envelope::Stop(reason) => return Some(Ending::Stop(reason)),
    };
    follow_up(actor, ctx, outcome)
}

/// Drain deferred actions after a hook, then check for a stop request.
fn follow_up<A: Actor>(
    actor: &mut A,
    ctx: &mut Context,
    outcome: Result<(), String>,
) -> Option<Ending> {
    if let Err(reason) = outcome {
        return Some(Ending::Fail(reason));
    }
    while let Some(tag) = ctx.deferred.pop_front() {
        match guard(|| actor.on_deferred_action(tag, ctx)) {
            // A chained action runs before anything queued earlier.
            Ok(Some(next)) => ctx.deferred.push_front(next),
            Ok(None) => {}
            Err(reason) => return Some(Ending::Fail(reason)),
        }
    }
    ctx.take_stop().map(Ending::Stop)
}

fn terminate<A: Actor>(
    actor: &mut A,
    ctx: &mut Context,
    rx: &mut mpsc::UnboundedReceiver<Envelope>,
    ending: Ending,
) {
    let me = ctx.myself().clone();
    let exit = match ending {
        Ending::Stop(reason) => {
            me.set_status(ActorStatus::Stopping);
            if let Err(panicked) = guard(|| {
                actor.on_stop(&reason, ctx);
                Ok(())
            }) {
                warn!(actor = %me.name(), reason = %panicked, "on_stop failed");
            }
            debug!(actor = %me.name(), %reason, "stopped");
            ExitReason::Stopped(reason)
        }
        Ending::Fail(reason) => {
            error!(actor = %me.name(), at = %ctx.now(), %reason, "actor failed");
            ctx.simulation().record_failure(FailureRecord {
                actor: me.name().to_string(),
                reason: reason.clone(),
                at: ctx.now(),
            });
            ExitReason::Failed(reason)
        }
    };
    ctx.cancel_all_timers();
    ctx.deferred.clear();
    me.finish(exit);
    close_mailbox(&me, rx);
}

/// Refuse further posts and release the activity held by anything
/// still queued.
fn close_mailbox(me: &ActorRef, rx: &mut mpsc::UnboundedReceiver<Envelope>) {
    rx.close();
    let mut dropped = 0usize;
    while let Ok(envelope) = rx.try_recv() {
        drop(envelope);
        me.end_activity();
        dropped += 1;
    }
    if dropped > 0 {
        debug!(actor = %me.name(), dropped, "mailbox discarded");
    }
}

fn record_receive(ctx: &Context) {
    if let Some(recorder) = ctx.simulation().recorder() {
        recorder.record_receive(ctx.name());
    }
}

/// Run a hook, turning both `Err` and panics into a failure reason.
fn guard<T>(hook: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_maps_errors_and_panics() {
        assert_eq!(guard(|| Ok(3)), Ok(3));
        assert_eq!(
            guard::<()>(|| Err(anyhow::anyhow!("bad input"))),
            Err("bad input".to_string())
        );
        let panicked = guard::<()>(|| panic!("kaboom"));
        assert_eq!(panicked, Err("panicked: kaboom".to_string()));
    }
}
