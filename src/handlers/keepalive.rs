//! Keepalive traffic: flow-control acknowledgments and server pings.

use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::event::{Event, Inbound, Outbound, Priority};
use crate::pipeline::{Context, Flow, Handler};
use crate::transport::LineTransport;

/// Parse the sequence number out of a `Q<n>` probe payload.
fn probe_sequence(payload: &str) -> Option<u64> {
    payload.strip_prefix('Q')?.parse().ok()
}

/// Consumes `PONG Q<n>` replies to the transport's probes and advances its
/// window. Other pongs pass through.
#[derive(Debug)]
pub struct KeepaliveAck {
    transport: Arc<LineTransport>,
}

impl KeepaliveAck {
    /// Handler name.
    pub const NAME: &'static str = "keepalive-ack";

    /// Acknowledge on `transport`.
    pub fn new(transport: Arc<LineTransport>) -> Self {
        Self { transport }
    }
}

impl Handler for KeepaliveAck {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle(&self, _ctx: &Context<'_>, event: &mut Event) -> Result<Flow> {
        if let Event::Received(Inbound::ServerPong { payload, .. }) = event {
            if let Some(seq) = probe_sequence(payload) {
                trace!(seq, "keepalive acknowledged");
                self.transport.acknowledge(seq);
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }
}

/// Answers server `PING` with `PONG` at high priority.
#[derive(Debug, Default)]
pub struct PingResponder;

impl PingResponder {
    /// Handler name.
    pub const NAME: &'static str = "ping-responder";
}

impl Handler for PingResponder {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle(&self, ctx: &Context<'_>, event: &mut Event) -> Result<Flow> {
        if let Event::Received(Inbound::ServerPing { payload }) = event {
            ctx.send_with_priority(Outbound::Pong(payload.clone()), Priority::High);
        }
        Ok(Flow::Continue)
    }
}
