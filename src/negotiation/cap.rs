//! `CAP` negotiation.

use tracing::{debug, info};

use crate::capability::{self, Capability};
use crate::connection::Local;
use crate::error::Result;
use crate::event::{Event, Inbound, Outbound, Priority};
use crate::pipeline::{Context, Flow, Handler};

/// Where capability negotiation stands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CapPhase {
    /// Nothing sent yet.
    #[default]
    NotStarted,
    /// `CAP LS` sent, waiting for (the rest of) the list.
    ListRequested,
    /// The full list arrived.
    ListReceived,
    /// `CAP REQ` sent.
    Requested,
    /// The request was acknowledged.
    Acked,
    /// The request was rejected.
    Naked,
    /// `CAP END` sent.
    Ended,
}

/// Per-connection negotiation state.
#[derive(Debug, Default)]
pub struct CapState {
    phase: CapPhase,
    offered: Vec<Capability>,
    enabled: Vec<String>,
}

impl Local for CapState {}

impl CapState {
    /// Current phase.
    pub fn phase(&self) -> CapPhase {
        self.phase
    }

    /// Everything the server offered, in order.
    pub fn offered(&self) -> &[Capability] {
        &self.offered
    }

    /// Capabilities the server acknowledged.
    pub fn enabled(&self) -> &[String] {
        &self.enabled
    }

    /// Whether `name` was acknowledged.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.iter().any(|c| c == name)
    }
}

/// Drives `CAP LS` / `REQ` / `END`.
///
/// Inbound, it reacts to the connection starting and to `CAP` replies.
/// Outbound, it lets the first `CAP END` through and drops repeats.
#[derive(Debug)]
pub struct CapNegotiator {
    desired: Vec<String>,
    version: Option<u32>,
}

impl CapNegotiator {
    /// Handler name.
    pub const NAME: &'static str = "cap-negotiator";

    /// Negotiate `desired`, announcing `version` in `CAP LS`.
    pub fn new(desired: Vec<String>, version: Option<u32>) -> Self {
        Self { desired, version }
    }

    fn received(&self, ctx: &Context<'_>, inbound: &Inbound) {
        let locals = ctx.connection().locals();
        let reply = match inbound {
            Inbound::Connected => {
                locals.insert(CapState {
                    phase: CapPhase::ListRequested,
                    ..CapState::default()
                });
                Some(Outbound::CapLs {
                    version: self.version,
                })
            }
            Inbound::CapList { capabilities, more } => locals
                .with_mut(|state: &mut CapState| self.on_list(state, capabilities, *more))
                .flatten(),
            Inbound::CapAck { capabilities } => locals
                .with_mut(|state: &mut CapState| {
                    if state.phase != CapPhase::Requested {
                        return None;
                    }
                    state.phase = CapPhase::Acked;
                    for cap in capabilities {
                        if cap.disable {
                            state.enabled.retain(|c| *c != cap.name);
                        } else if !state.is_enabled(&cap.name) {
                            state.enabled.push(cap.name.clone());
                        }
                    }
                    info!(enabled = ?state.enabled, "capabilities acknowledged");
                    Some(Outbound::CapEnd)
                })
                .flatten(),
            Inbound::CapNak { capabilities } => locals
                .with_mut(|state: &mut CapState| {
                    if state.phase != CapPhase::Requested {
                        return None;
                    }
                    // The whole request failed; there is no partial retry.
                    state.phase = CapPhase::Naked;
                    info!(rejected = capabilities.len(), "capability request rejected");
                    Some(Outbound::CapEnd)
                })
                .flatten(),
            Inbound::Disconnected(_) => {
                locals.remove::<CapState>();
                None
            }
            _ => None,
        };

        if let Some(message) = reply {
            ctx.send_with_priority(message, Priority::High);
        }
    }

    fn on_list(
        &self,
        state: &mut CapState,
        capabilities: &[Capability],
        more: bool,
    ) -> Option<Outbound> {
        if state.phase != CapPhase::ListRequested {
            return None;
        }
        state.offered.extend(capabilities.iter().cloned());
        if more {
            return None;
        }

        state.phase = CapPhase::ListReceived;
        let request = capability::requestable(&state.offered, &self.desired);
        debug!(offered = state.offered.len(), ?request, "capability list complete");
        if request.is_empty() {
            Some(Outbound::CapEnd)
        } else {
            state.phase = CapPhase::Requested;
            Some(Outbound::CapReq(request))
        }
    }
}

impl Handler for CapNegotiator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle(&self, ctx: &Context<'_>, event: &mut Event) -> Result<Flow> {
        match event {
            Event::Received(inbound) => {
                self.received(ctx, inbound);
                Ok(Flow::Continue)
            }
            Event::Transmit {
                message: Outbound::CapEnd,
                ..
            } => {
                let first = ctx
                    .connection()
                    .locals()
                    .get_or_insert_with(CapState::default, |state| {
                        let first = state.phase != CapPhase::Ended;
                        state.phase = CapPhase::Ended;
                        first
                    });
                if first {
                    Ok(Flow::Continue)
                } else {
                    debug!("dropping duplicate CAP END");
                    Ok(Flow::Stop)
                }
            }
            Event::Transmit { .. } => Ok(Flow::Continue),
        }
    }
}
