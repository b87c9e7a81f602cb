//! `Actor` trait and the lifecycle types around it.

use std::fmt;

use crate::message::Message;

use super::context::Context;

// ── Actor ─────────────────────────────────────────────────────────────

/// Trait implemented by every actor run through the wrapper.
///
/// Hooks run one at a time on the actor's own task, in mailbox order.
/// Every hook gets a [`Context`] through which all time-related side
/// effects must go: delayed messages, timer cancellation, sends to other
/// actors. An actor that calls tokio timers directly escapes virtual
/// time.
///
/// A hook that returns `Err` or panics terminates the actor. The failure
/// is logged and recorded; other actors keep running.
///
/// # Example
///
/// ```rust
/// use timewarp::actor::{Actor, Context, Started};
/// use timewarp::Message;
///
/// struct Counter { hits: u64 }
///
/// impl Actor for Counter {
///     type Args = u64;
///
///     fn on_start(start: u64, _ctx: &mut Context) -> anyhow::Result<Started<Self>> {
///         Ok(Started::new(Counter { hits: start }))
///     }
///
///     fn on_async_message(&mut self, _msg: Message, _ctx: &mut Context) -> anyhow::Result<()> {
///         self.hits += 1;
///         Ok(())
///     }
/// }
/// ```
pub trait Actor: Sized + Send + 'static {
    /// Start arguments.
    type Args: Send + 'static;

    /// Build the actor. `Err` rejects the start; the actor never runs.
    fn on_start(args: Self::Args, ctx: &mut Context) -> anyhow::Result<Started<Self>>;

    /// Answer a synchronous request. `Ok(None)` leaves the caller
    /// without a reply.
    fn on_sync_request(
        &mut self,
        request: Message,
        ctx: &mut Context,
    ) -> anyhow::Result<Option<Message>> {
        let _ = (request, ctx);
        Ok(None)
    }

    /// Handle a fire-and-forget message.
    fn on_async_message(&mut self, message: Message, ctx: &mut Context) -> anyhow::Result<()> {
        let _ = (message, ctx);
        Ok(())
    }

    /// Handle a message this actor scheduled for itself with
    /// `send_after`. Defaults to [`on_async_message`](Self::on_async_message).
    ///
    /// Delayed messages scheduled by other actors (`send_after_to`)
    /// arrive through `on_async_message` instead.
    fn on_timer_message(&mut self, message: Message, ctx: &mut Context) -> anyhow::Result<()> {
        self.on_async_message(message, ctx)
    }

    /// Run a deferred action. Returning `Some(tag)` chains another one,
    /// which runs before the next mailbox message.
    fn on_deferred_action(
        &mut self,
        tag: Message,
        ctx: &mut Context,
    ) -> anyhow::Result<Option<Message>> {
        let _ = (tag, ctx);
        Ok(None)
    }

    /// Called once on orderly stop. Not called when a hook failed.
    fn on_stop(&mut self, reason: &StopReason, ctx: &mut Context) {
        let _ = (reason, ctx);
    }

    /// Migrate state after a code upgrade from `from_version`.
    fn on_state_upgrade(&mut self, from_version: Message, ctx: &mut Context) -> anyhow::Result<()> {
        let _ = (from_version, ctx);
        Ok(())
    }
}

// ── Started ───────────────────────────────────────────────────────────

/// Successful result of [`Actor::on_start`].
#[derive(Debug)]
pub struct Started<A> {
    /// The initialised actor.
    pub actor: A,
    /// Deferred action to run before the first mailbox message.
    pub continuation: Option<Message>,
}

impl<A> Started<A> {
    /// Start without a deferred action.
    pub fn new(actor: A) -> Self {
        Started {
            actor,
            continuation: None,
        }
    }

    /// Run `tag` through `on_deferred_action` before anything else.
    pub fn continue_with(mut self, tag: impl Into<Message>) -> Self {
        self.continuation = Some(tag.into());
        self
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────────

/// Why an actor was asked to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The actor stopped itself or was stopped explicitly.
    Normal,
    /// The owning simulation is shutting down.
    Shutdown,
    /// Application-specific reason.
    Other(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Normal => write!(f, "normal"),
            StopReason::Shutdown => write!(f, "shutdown"),
            StopReason::Other(reason) => write!(f, "{reason}"),
        }
    }
}

/// How an actor terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Orderly stop; `on_stop` ran.
    Stopped(StopReason),
    /// A hook returned an error or panicked.
    Failed(String),
    /// `on_start` refused to start.
    Rejected(String),
}

impl ExitReason {
    /// Returns `true` for [`ExitReason::Failed`].
    pub fn is_failure(&self) -> bool {
        matches!(self, ExitReason::Failed(_))
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Stopped(reason) => write!(f, "stopped ({reason})"),
            ExitReason::Failed(reason) => write!(f, "failed: {reason}"),
            ExitReason::Rejected(reason) => write!(f, "rejected: {reason}"),
        }
    }
}

/// Lifecycle state visible through an [`ActorRef`](super::ActorRef).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActorStatus {
    /// `on_start` has not finished yet.
    Starting = 0,
    /// Processing its mailbox.
    Running = 1,
    /// Running `on_stop`.
    Stopping = 2,
    /// Terminated; the mailbox is closed.
    Terminated = 3,
}

impl ActorStatus {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ActorStatus::Starting,
            1 => ActorStatus::Running,
            2 => ActorStatus::Stopping,
            _ => ActorStatus::Terminated,
        }
    }
}
