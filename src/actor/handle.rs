//! `ActorRef` — cloneable handle to a running actor, plus the mailbox
//! envelope it posts.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::clock::Activity;
use crate::error::{SimError, SimResult};
use crate::event::{Recipient, TimerId};
use crate::message::Message;
use crate::simulation::TraceKind;

use super::id::ActorId;
use super::traits::{ActorStatus, ExitReason, StopReason};

// ── Envelope ──────────────────────────────────────────────────────────

/// One mailbox entry.
pub(crate) enum Envelope {
    /// Fire-and-forget message from another actor or the driver.
    Message {
        from: Option<String>,
        message: Message,
        kind: TraceKind,
    },
    /// Synchronous request awaiting a reply.
    Call {
        from: Option<String>,
        message: Message,
        reply: oneshot::Sender<Message>,
    },
    /// Delivery from the time backend.
    Timer { id: TimerId, message: Message },
    /// Code-upgrade notification.
    Upgrade(Message),
    /// Orderly stop request.
    Stop(StopReason),
}

// ── ActorRef ──────────────────────────────────────────────────────────

struct Shared {
    id: ActorId,
    name: String,
    tx: mpsc::UnboundedSender<Envelope>,
    status: AtomicU8,
    activity: Option<Arc<Activity>>,
    exit: watch::Sender<Option<ExitReason>>,
}

/// Handle to an actor. Cheap to clone; all clones address the same
/// mailbox.
#[derive(Clone)]
pub struct ActorRef {
    shared: Arc<Shared>,
}

impl ActorRef {
    pub(crate) fn new(
        id: ActorId,
        name: String,
        activity: Option<Arc<Activity>>,
    ) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (exit, _) = watch::channel(None);
        let actor = ActorRef {
            shared: Arc::new(Shared {
                id,
                name,
                tx,
                status: AtomicU8::new(ActorStatus::Starting as u8),
                activity,
                exit,
            }),
        };
        (actor, rx)
    }

    /// Incarnation ID.
    pub fn id(&self) -> ActorId {
        self.shared.id
    }

    /// Name the actor is addressed by.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ActorStatus {
        ActorStatus::from_u8(self.shared.status.load(Ordering::SeqCst))
    }

    /// Returns `true` until the actor has terminated.
    pub fn is_alive(&self) -> bool {
        self.status() != ActorStatus::Terminated
    }

    /// How the actor terminated, if it has.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.shared.exit.borrow().clone()
    }

    /// Returns `true` if both handles address the same actor.
    pub fn same_actor(&self, other: &ActorRef) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Post a fire-and-forget message.
    pub fn cast(&self, message: impl Into<Message>) -> SimResult<()> {
        self.post(Envelope::Message {
            from: None,
            message: message.into(),
            kind: TraceKind::Cast,
        })
    }

    /// Send a synchronous request and wait for the reply.
    ///
    /// The timeout is measured in real time, not virtual time.
    pub async fn call(&self, message: impl Into<Message>, timeout: Duration) -> SimResult<Message> {
        self.call_from(None, message.into(), timeout).await
    }

    pub(crate) async fn call_from(
        &self,
        from: Option<String>,
        message: Message,
        timeout: Duration,
    ) -> SimResult<Message> {
        let (reply, rx) = oneshot::channel();
        self.post(Envelope::Call {
            from,
            message,
            reply,
        })?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(_)) => Err(SimError::NoReply(self.name().to_string())),
            Err(_) => Err(SimError::CallTimeout {
                actor: self.name().to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Ask the actor to run `on_state_upgrade(from_version)`.
    pub fn upgrade(&self, from_version: impl Into<Message>) -> SimResult<()> {
        self.post(Envelope::Upgrade(from_version.into()))
    }

    /// Request an orderly stop. Messages already queued are handled
    /// first.
    pub fn request_stop(&self, reason: StopReason) -> SimResult<()> {
        self.post(Envelope::Stop(reason))
    }

    /// Stop the actor and wait for it to terminate. Stopping a
    /// terminated actor returns its original exit reason.
    pub async fn stop(&self, reason: StopReason) -> ExitReason {
        if self.request_stop(reason).is_err() {
            debug!(actor = %self.name(), "stop requested on terminated actor");
        }
        self.wait().await
    }

    /// Wait until the actor has terminated.
    pub async fn wait(&self) -> ExitReason {
        let mut rx = self.shared.exit.subscribe();
        let exit = match rx.wait_for(Option::is_some).await {
            Ok(exit) => (*exit).clone(),
            Err(_) => None,
        };
        exit.unwrap_or(ExitReason::Stopped(StopReason::Normal))
    }

    /// Enqueue an envelope, counting it against the clock barrier.
    pub(crate) fn post(&self, envelope: Envelope) -> SimResult<()> {
        if let Some(activity) = &self.shared.activity {
            activity.begin();
        }
        if self.shared.tx.send(envelope).is_err() {
            self.end_activity();
            return Err(SimError::ActorNotRunning(self.name().to_string()));
        }
        Ok(())
    }

    pub(crate) fn end_activity(&self) {
        if let Some(activity) = &self.shared.activity {
            activity.end();
        }
    }

    pub(crate) fn begin_activity(&self) {
        if let Some(activity) = &self.shared.activity {
            activity.begin();
        }
    }

    pub(crate) fn set_status(&self, status: ActorStatus) {
        self.shared.status.store(status as u8, Ordering::SeqCst);
    }

    pub(crate) fn finish(&self, exit: ExitReason) {
        self.set_status(ActorStatus::Terminated);
        self.shared.exit.send_replace(Some(exit));
    }
}

impl Recipient for ActorRef {
    fn deliver(&self, timer: TimerId, payload: Message) {
        if self
            .post(Envelope::Timer {
                id: timer,
                message: payload,
            })
            .is_err()
        {
            debug!(actor = %self.name(), %timer, "timer fired for terminated actor");
        }
    }

    fn label(&self) -> String {
        self.shared.name.clone()
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("status", &self.status())
            .finish()
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.shared.name, self.shared.id)
    }
}
