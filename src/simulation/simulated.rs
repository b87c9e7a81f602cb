//! `SimulatedActor` — runs an [`ActorDefinition`] through the actor
//! wrapper.

use tracing::warn;

use crate::actor::{Actor, Context, Started};
use crate::message::Message;

use super::definition::{ActorDefinition, Behaviour, Outcome, SendPattern};

/// The wrapper-side half of a declarative actor.
///
/// The send pattern is driven by a self-addressed timer carrying the
/// pattern's message: every fire emits, then re-arms for repeating
/// patterns, so the cadence never drifts.
pub(crate) struct SimulatedActor {
    pattern: Option<SendPattern>,
    targets: Vec<String>,
    behaviour: Box<dyn Behaviour>,
}

impl SimulatedActor {
    fn emit(&mut self, message: Message, ctx: &mut Context) -> anyhow::Result<()> {
        let copies = match &self.pattern {
            None => return self.react(message, false, ctx).map(|_| ()),
            Some(SendPattern::SelfMessage { .. }) => {
                ctx.record_self_delivery(&message);
                return self.react(message, false, ctx).map(|_| ());
            }
            Some(SendPattern::Burst { count, .. }) => *count,
            Some(_) => 1,
        };
        // Targets in declaration order; a burst's copies stay contiguous.
        for target in &self.targets {
            for _ in 0..copies {
                ctx.send(target, message.clone())?;
            }
        }
        let interval = self.pattern.as_ref().map_or(0, SendPattern::interval);
        ctx.send_after(message, interval)?;
        Ok(())
    }

    /// Run the handlers and carry out the outcome. Returns the reply for
    /// calls.
    fn react(
        &mut self,
        message: Message,
        is_call: bool,
        ctx: &mut Context,
    ) -> anyhow::Result<Option<Message>> {
        match self.behaviour.handle(&message)? {
            Outcome::Ok => Ok(None),
            Outcome::Reply(answer) if is_call => Ok(Some(answer)),
            Outcome::Reply(answer) => {
                warn!(
                    actor = %ctx.name(),
                    %message,
                    %answer,
                    "reply outcome for a non-call message ignored"
                );
                Ok(None)
            }
            Outcome::Send(sends) => {
                for (to, outgoing) in sends {
                    ctx.send(&to, outgoing)?;
                }
                Ok(None)
            }
        }
    }
}

impl Actor for SimulatedActor {
    type Args = ActorDefinition;

    fn on_start(def: ActorDefinition, ctx: &mut Context) -> anyhow::Result<Started<Self>> {
        if let Some(pattern) = &def.pattern {
            ctx.send_after(pattern.message().clone(), pattern.interval())?;
        }
        Ok(Started::new(SimulatedActor {
            pattern: def.pattern,
            targets: def.targets,
            behaviour: def.behaviour,
        }))
    }

    fn on_sync_request(
        &mut self,
        request: Message,
        ctx: &mut Context,
    ) -> anyhow::Result<Option<Message>> {
        self.react(request, true, ctx)
    }

    fn on_async_message(&mut self, message: Message, ctx: &mut Context) -> anyhow::Result<()> {
        self.react(message, false, ctx).map(|_| ())
    }

    fn on_timer_message(&mut self, message: Message, ctx: &mut Context) -> anyhow::Result<()> {
        self.emit(message, ctx)
    }
}
