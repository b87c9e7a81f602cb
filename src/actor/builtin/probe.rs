//! `Probe` — records everything it receives for test assertions.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::actor::{Actor, Context, Started};
use crate::message::Message;
use crate::time::VirtualTime;

/// One delivery observed by a [`Probe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub at: VirtualTime,
    pub from: Option<String>,
    pub message: Message,
}

/// Shared view of a probe's deliveries, readable from the driver.
pub type ProbeLog = Arc<Mutex<Vec<Received>>>;

/// A passive sink. Casts and timer messages are appended to the log in
/// delivery order; a call to `:count` answers with the number of
/// entries so far.
#[derive(Debug)]
pub struct Probe {
    log: ProbeLog,
}

impl Probe {
    /// A fresh, empty log to start a probe with.
    pub fn log() -> ProbeLog {
        Arc::new(Mutex::new(Vec::new()))
    }
}

impl Actor for Probe {
    type Args = ProbeLog;

    fn on_start(log: ProbeLog, _ctx: &mut Context) -> anyhow::Result<Started<Self>> {
        Ok(Started::new(Probe { log }))
    }

    fn on_sync_request(
        &mut self,
        request: Message,
        _ctx: &mut Context,
    ) -> anyhow::Result<Option<Message>> {
        if request.is_atom("count") {
            return Ok(Some(Message::Int(self.log.lock().len() as i64)));
        }
        Ok(None)
    }

    fn on_async_message(&mut self, message: Message, ctx: &mut Context) -> anyhow::Result<()> {
        self.log.lock().push(Received {
            at: ctx.now(),
            from: ctx.sender().map(str::to_string),
            message,
        });
        Ok(())
    }
}
