//! The outbound end of the pipeline.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::Result;
use crate::event::Event;
use crate::pipeline::{Context, Flow, Handler};
use crate::transport::{LineTransport, OutboundJob};
use crate::wire;

/// Renders each outbound command and queues the lines on the transport.
///
/// Commands that fail to render (no targets, empty message) are logged and
/// dropped.
#[derive(Debug)]
pub struct TransportSink {
    transport: Arc<LineTransport>,
}

impl TransportSink {
    /// Handler name.
    pub const NAME: &'static str = "transport-sink";

    /// Queue lines on `transport`.
    pub fn new(transport: Arc<LineTransport>) -> Self {
        Self { transport }
    }
}

impl Handler for TransportSink {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle(&self, _ctx: &Context<'_>, event: &mut Event) -> Result<Flow> {
        let Event::Transmit { message, priority } = event else {
            return Ok(Flow::Continue);
        };

        match wire::render(message) {
            Ok(lines) => {
                for line in lines {
                    trace!(text = %line.text, ?priority, "queueing line");
                    self.transport.enqueue(
                        OutboundJob::line(*priority, line.text)
                            .with_emission_key(line.emission_key),
                    );
                }
            }
            Err(e) => warn!(error = %e, "dropping outbound command"),
        }
        Ok(Flow::Stop)
    }
}
