//! `echo-message` suppression.

use tracing::trace;

use crate::error::Result;
use crate::event::{Event, Inbound};
use crate::pipeline::{Context, Flow, Handler};
use crate::source::Source;
use crate::transport::EmissionLog;
use crate::wire::EmissionKey;

/// Stops inbound messages that are the server echoing lines we wrote.
///
/// A message counts as an echo when its sender is our own nickname and its
/// emission key is in the connection's [`EmissionLog`]. The matching entry is
/// consumed, so each written line suppresses at most one echo.
#[derive(Debug, Default)]
pub struct EchoFilter;

impl EchoFilter {
    /// Handler name.
    pub const NAME: &'static str = "echo-filter";
}

fn sender(event: &Inbound) -> Option<&Source> {
    match event {
        Inbound::Message { source, .. }
        | Inbound::Notice { source, .. }
        | Inbound::Action { source, .. }
        | Inbound::CtcpCommand { source, .. }
        | Inbound::CtcpResponse { source, .. } => source.as_ref(),
        _ => None,
    }
}

impl Handler for EchoFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle(&self, ctx: &Context<'_>, event: &mut Event) -> Result<Flow> {
        let Event::Received(inbound) = event else {
            return Ok(Flow::Continue);
        };
        let connection = ctx.connection();
        let from_me = sender(inbound)
            .and_then(Source::nick)
            .is_some_and(|nick| connection.is_me(nick));
        if !from_me {
            return Ok(Flow::Continue);
        }
        let Some(key) = EmissionKey::for_inbound(inbound) else {
            return Ok(Flow::Continue);
        };

        let echoed = connection
            .locals()
            .with_mut(|log: &mut EmissionLog| log.consume(&key))
            .unwrap_or(false);
        if echoed {
            trace!(%key, "suppressing echo");
            Ok(Flow::Stop)
        } else {
            Ok(Flow::Continue)
        }
    }
}
