//! `Echo` — sends every message back to whoever sent it.

use crate::actor::{Actor, Context, Started};
use crate::message::Message;

/// Echoes casts back to their sender after `delay` ms of backend time
/// and answers every call with the request itself.
///
/// Messages without a known sender (timers, driver casts) are counted
/// and dropped.
#[derive(Debug, Clone)]
pub struct Echo {
    pub delay: u64,
    pub echo_count: u64,
}

impl Actor for Echo {
    /// Echo delay in ms.
    type Args = u64;

    fn on_start(delay: u64, _ctx: &mut Context) -> anyhow::Result<Started<Self>> {
        Ok(Started::new(Echo {
            delay,
            echo_count: 0,
        }))
    }

    fn on_sync_request(
        &mut self,
        request: Message,
        _ctx: &mut Context,
    ) -> anyhow::Result<Option<Message>> {
        self.echo_count += 1;
        Ok(Some(request))
    }

    fn on_async_message(&mut self, message: Message, ctx: &mut Context) -> anyhow::Result<()> {
        self.echo_count += 1;
        let Some(sender) = ctx.sender().map(str::to_string) else {
            return Ok(());
        };
        if self.delay == 0 {
            ctx.send(&sender, message)?;
        } else {
            let target = ctx.lookup(&sender)?;
            ctx.send_after_to(&target, message, self.delay)?;
        }
        Ok(())
    }
}
