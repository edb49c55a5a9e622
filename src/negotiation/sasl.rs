//! SASL authentication over `AUTHENTICATE`.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::capability;
use crate::connection::Local;
use crate::error::Result;
use crate::event::{Event, Inbound, Outbound, Priority};
use crate::parser::ChallengeBuffer;
use crate::pipeline::{Context, Flow, Handler};
use crate::sasl::{parse_mechanisms, MechanismFactory, SaslCallbacks, SaslClient};
use crate::wire::authenticate_chunks;

/// Where authentication stands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthPhase {
    /// Not started.
    #[default]
    Idle,
    /// `AUTHENTICATE <mechanism>` sent, waiting for the first challenge.
    MechanismOffered,
    /// Exchanging challenges and responses.
    ChallengeLoop,
    /// The server confirmed authentication.
    Succeeded,
    /// Every mechanism failed, or the server refused outright.
    Failed,
}

/// Per-connection authentication state.
///
/// Removing it from the connection's locals disposes the active mechanism client.
#[derive(Default)]
pub struct AuthState {
    phase: AuthPhase,
    supported: bool,
    offered: Vec<String>,
    queue: VecDeque<String>,
    tried: Vec<String>,
    client: Option<Box<dyn SaslClient>>,
    exchange_complete: bool,
}

impl Local for AuthState {
    fn dispose(&mut self) {
        self.release_client();
    }
}

impl AuthState {
    /// Current phase.
    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    /// Whether the server advertised `sasl`.
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Whether an exchange is running.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self.phase,
            AuthPhase::MechanismOffered | AuthPhase::ChallengeLoop
        )
    }

    /// Mechanisms attempted so far, in order.
    pub fn tried(&self) -> &[String] {
        &self.tried
    }

    /// Whether the mechanism had finished its side of the exchange when the
    /// server reported success. For SCRAM this means the server signature was
    /// verified.
    pub fn exchange_complete(&self) -> bool {
        self.exchange_complete
    }

    /// Mechanism of the active client.
    pub fn current_mechanism(&self) -> Option<&str> {
        self.client.as_ref().map(|c| c.mechanism())
    }

    #[cfg(test)]
    pub(crate) fn force_phase(&mut self, phase: AuthPhase) {
        self.phase = phase;
    }

    fn release_client(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.dispose();
        }
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("phase", &self.phase)
            .field("supported", &self.supported)
            .field("queue", &self.queue)
            .field("tried", &self.tried)
            .field("current", &self.current_mechanism())
            .field("exchange_complete", &self.exchange_complete)
            .finish()
    }
}

/// Authenticates with SASL once the server acknowledges the `sasl`
/// capability, falling through the offered mechanisms until one succeeds.
///
/// While an exchange is running, outbound `CAP END` is held back so
/// capability negotiation cannot end before authentication does.
pub struct SaslAuthenticator {
    factory: Arc<dyn MechanismFactory>,
    callbacks: Arc<dyn SaslCallbacks>,
}

impl SaslAuthenticator {
    /// Handler name.
    pub const NAME: &'static str = "sasl-authenticator";

    /// Authenticate with mechanisms built by `factory` from `callbacks`.
    pub fn new(factory: Arc<dyn MechanismFactory>, callbacks: Arc<dyn SaslCallbacks>) -> Self {
        Self { factory, callbacks }
    }

    /// Start the next usable mechanism, or give up when none are left.
    fn try_next(&self, state: &mut AuthState, out: &mut Vec<Outbound>) {
        state.release_client();
        while let Some(name) = state.queue.pop_front() {
            state.tried.push(name.clone());
            match self.factory.create(&name, Arc::clone(&self.callbacks)) {
                Some(client) => {
                    debug!(mechanism = %name, "starting SASL mechanism");
                    out.push(Outbound::Authenticate(client.mechanism().to_owned()));
                    state.client = Some(client);
                    state.phase = AuthPhase::MechanismOffered;
                    return;
                }
                None => debug!(mechanism = %name, "SASL mechanism unavailable"),
            }
        }

        info!(tried = ?state.tried, "SASL mechanisms exhausted, continuing unauthenticated");
        state.phase = AuthPhase::Failed;
        out.push(Outbound::CapEnd);
    }

    fn abort(&self, state: &mut AuthState, out: &mut Vec<Outbound>) {
        out.push(Outbound::Authenticate("*".to_owned()));
        self.try_next(state, out);
    }

    fn received(&self, state: &mut AuthState, inbound: &Inbound, out: &mut Vec<Outbound>) -> Flow {
        match inbound {
            Inbound::CapList { capabilities, .. } => {
                if let Some(cap) = capability::find(capabilities, "sasl") {
                    state.supported = true;
                    state.offered = cap
                        .value
                        .as_deref()
                        .map(parse_mechanisms)
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| vec!["PLAIN".to_owned()]);
                }
            }
            Inbound::CapAck { capabilities } => {
                let acked = capabilities.iter().any(|c| c.name == "sasl" && !c.disable);
                if acked && state.phase == AuthPhase::Idle {
                    if state.offered.is_empty() {
                        state.offered.push("PLAIN".to_owned());
                    }
                    state.queue = state.offered.iter().cloned().collect();
                    self.try_next(state, out);
                }
            }
            Inbound::AuthenticationChallenge { payload } if state.is_in_progress() => {
                let Some(client) = state.client.as_mut() else {
                    return Flow::Continue;
                };
                match client.evaluate(payload) {
                    Ok(response) => {
                        state.phase = AuthPhase::ChallengeLoop;
                        out.extend(
                            authenticate_chunks(&response)
                                .into_iter()
                                .map(Outbound::Authenticate),
                        );
                    }
                    Err(e) => {
                        warn!(mechanism = client.mechanism(), error = %e, "SASL mechanism failed");
                        self.abort(state, out);
                    }
                }
                return Flow::Stop;
            }
            Inbound::MalformedChallenge { error } if state.is_in_progress() => {
                warn!(%error, "malformed SASL challenge");
                self.abort(state, out);
                return Flow::Stop;
            }
            Inbound::AuthenticationFailed { kind, reason } if state.is_in_progress() => {
                if kind.is_retryable() {
                    debug!(?kind, %reason, "SASL attempt failed, trying next mechanism");
                    self.try_next(state, out);
                } else {
                    info!(?kind, %reason, "SASL authentication refused");
                    state.release_client();
                    state.phase = AuthPhase::Failed;
                    out.push(Outbound::CapEnd);
                }
            }
            Inbound::LoggedOut if state.is_in_progress() => {
                self.try_next(state, out);
            }
            Inbound::SaslSuccess if state.is_in_progress() => {
                info!(mechanism = ?state.current_mechanism(), "SASL authentication succeeded");
                state.exchange_complete = state.client.as_ref().is_some_and(|c| c.is_complete());
                if !state.exchange_complete {
                    warn!(
                        mechanism = ?state.current_mechanism(),
                        "server reported success before the mechanism finished"
                    );
                }
                state.release_client();
                state.phase = AuthPhase::Succeeded;
                out.push(Outbound::CapEnd);
            }
            Inbound::SaslMechanisms { mechanisms } => {
                state.queue = mechanisms
                    .iter()
                    .map(|m| m.to_ascii_uppercase())
                    .filter(|m| !state.tried.contains(m))
                    .collect();
            }
            _ => {}
        }
        Flow::Continue
    }
}

impl Handler for SaslAuthenticator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle(&self, ctx: &Context<'_>, event: &mut Event) -> Result<Flow> {
        let locals = ctx.connection().locals();
        match event {
            Event::Received(Inbound::Disconnected(_)) => {
                locals.remove::<AuthState>();
                locals.remove::<ChallengeBuffer>();
                Ok(Flow::Continue)
            }
            Event::Received(inbound) => {
                let mut out = Vec::new();
                let (flow, finished) = locals.get_or_insert_with(AuthState::default, |state| {
                    let was_running = state.is_in_progress();
                    let flow = self.received(state, inbound, &mut out);
                    (flow, was_running && !state.is_in_progress())
                });
                if finished {
                    locals.remove::<ChallengeBuffer>();
                }
                for message in out {
                    ctx.send_with_priority(message, Priority::High);
                }
                Ok(flow)
            }
            Event::Transmit {
                message: Outbound::CapEnd,
                ..
            } => {
                let held = locals
                    .with(|state: &AuthState| state.is_in_progress())
                    .unwrap_or(false);
                if held {
                    debug!("holding CAP END until authentication finishes");
                    Ok(Flow::Stop)
                } else {
                    Ok(Flow::Continue)
                }
            }
            Event::Transmit { .. } => Ok(Flow::Continue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::parse_list;
    use crate::config::SaslCredentials;
    use crate::event::AuthFailure;
    use crate::negotiation::testing::{sent, Harness};
    use crate::negotiation::CapNegotiator;
    use crate::sasl::DefaultMechanisms;
    use crate::wire::encode_base64;

    fn harness(password: Option<&str>) -> Harness {
        let creds = SaslCredentials {
            account: "bot".into(),
            password: password.map(str::to_owned),
            ..SaslCredentials::default()
        };
        let h = Harness::new();
        h.add(CapNegotiator::new(vec!["sasl".into()], Some(302)));
        h.add(SaslAuthenticator::new(
            Arc::new(DefaultMechanisms),
            Arc::new(creds),
        ));
        h
    }

    fn negotiate(h: &Harness, ls: &str) {
        h.pipeline.dispatch_inbound(Inbound::Connected);
        h.pipeline.dispatch_inbound(Inbound::CapList {
            capabilities: parse_list(ls),
            more: false,
        });
        h.pipeline.dispatch_inbound(Inbound::CapAck {
            capabilities: parse_list("sasl"),
        });
    }

    fn auth(param: &str) -> Outbound {
        Outbound::Authenticate(param.to_owned())
    }

    fn phase(h: &Harness) -> Option<AuthPhase> {
        h.pipeline
            .connection()
            .locals()
            .with(|s: &AuthState| s.phase())
    }

    #[test]
    fn test_plain_flow() {
        let h = harness(Some("hunter2"));
        negotiate(&h, "sasl=PLAIN");

        // CAP END from the ACK is held while authenticating.
        assert_eq!(sent(&h).last(), Some(&auth("PLAIN")));
        assert!(!sent(&h).contains(&Outbound::CapEnd));

        h.pipeline
            .dispatch_inbound(Inbound::AuthenticationChallenge { payload: vec![] });
        assert_eq!(
            sent(&h).last(),
            Some(&auth(&encode_base64(b"\0bot\0hunter2")))
        );
        assert_eq!(phase(&h), Some(AuthPhase::ChallengeLoop));

        h.pipeline.dispatch_inbound(Inbound::SaslSuccess);
        assert_eq!(sent(&h).last(), Some(&Outbound::CapEnd));
        assert_eq!(phase(&h), Some(AuthPhase::Succeeded));
        assert_eq!(
            h.pipeline
                .connection()
                .locals()
                .with(|s: &AuthState| s.exchange_complete()),
            Some(true)
        );

        // Never re-triggers.
        h.pipeline.dispatch_inbound(Inbound::CapAck {
            capabilities: parse_list("sasl"),
        });
        assert_eq!(sent(&h).last(), Some(&Outbound::CapEnd));
    }

    #[test]
    fn test_premature_success_is_flagged() {
        let h = harness(Some("hunter2"));
        negotiate(&h, "sasl=PLAIN");
        assert_eq!(phase(&h), Some(AuthPhase::MechanismOffered));

        // Success before any challenge was answered.
        h.pipeline.dispatch_inbound(Inbound::SaslSuccess);
        assert_eq!(phase(&h), Some(AuthPhase::Succeeded));
        assert_eq!(
            h.pipeline
                .connection()
                .locals()
                .with(|s: &AuthState| s.exchange_complete()),
            Some(false)
        );
    }

    #[test]
    fn test_falls_through_mechanisms() {
        let h = harness(Some("pw"));
        negotiate(&h, "sasl=EXTERNAL,PLAIN");
        assert_eq!(sent(&h).last(), Some(&auth("EXTERNAL")));

        h.pipeline.dispatch_inbound(Inbound::AuthenticationFailed {
            kind: AuthFailure::Failed,
            reason: "SASL authentication failed".into(),
        });
        assert_eq!(sent(&h).last(), Some(&auth("PLAIN")));
        let tried = h
            .pipeline
            .connection()
            .locals()
            .with(|s: &AuthState| s.tried().to_vec())
            .unwrap();
        assert_eq!(tried, vec!["EXTERNAL", "PLAIN"]);
    }

    #[test]
    fn test_unusable_mechanism_skipped() {
        // No password: PLAIN cannot be built, nothing else offered.
        let h = harness(None);
        negotiate(&h, "sasl=PLAIN");
        let out = sent(&h);
        assert!(!out.iter().any(|m| matches!(m, Outbound::Authenticate(_))));
        assert_eq!(out.last(), Some(&Outbound::CapEnd));
        assert_eq!(phase(&h), Some(AuthPhase::Failed));
    }

    #[test]
    fn test_exhausted_gives_up_with_cap_end() {
        let h = harness(Some("pw"));
        negotiate(&h, "sasl");
        assert_eq!(sent(&h).last(), Some(&auth("PLAIN")));
        h.pipeline.dispatch_inbound(Inbound::AuthenticationFailed {
            kind: AuthFailure::Aborted,
            reason: String::new(),
        });
        assert_eq!(sent(&h).last(), Some(&Outbound::CapEnd));
        assert_eq!(phase(&h), Some(AuthPhase::Failed));
    }

    #[test]
    fn test_malformed_challenge_aborts() {
        let h = harness(Some("pw"));
        negotiate(&h, "sasl=PLAIN,EXTERNAL");
        h.pipeline.dispatch_inbound(Inbound::MalformedChallenge {
            error: "invalid base64".into(),
        });
        let out = sent(&h);
        let tail = &out[out.len() - 2..];
        assert_eq!(tail, &[auth("*"), auth("EXTERNAL")]);
    }

    #[test]
    fn test_mechanism_list_refresh() {
        let h = harness(Some("pw"));
        negotiate(&h, "sasl=EXTERNAL");
        h.pipeline.dispatch_inbound(Inbound::SaslMechanisms {
            mechanisms: vec!["EXTERNAL".into(), "plain".into()],
        });
        h.pipeline.dispatch_inbound(Inbound::AuthenticationFailed {
            kind: AuthFailure::Failed,
            reason: String::new(),
        });
        assert_eq!(sent(&h).last(), Some(&auth("PLAIN")));
    }

    #[test]
    fn test_non_retryable_failure_finishes() {
        let h = harness(Some("pw"));
        negotiate(&h, "sasl=EXTERNAL,PLAIN");
        h.pipeline.dispatch_inbound(Inbound::AuthenticationFailed {
            kind: AuthFailure::NickLocked,
            reason: String::new(),
        });
        assert_eq!(sent(&h).last(), Some(&Outbound::CapEnd));
        assert_eq!(phase(&h), Some(AuthPhase::Failed));
    }

    #[test]
    fn test_nak_skips_authentication() {
        let h = harness(Some("pw"));
        h.pipeline.dispatch_inbound(Inbound::Connected);
        h.pipeline.dispatch_inbound(Inbound::CapList {
            capabilities: parse_list("sasl"),
            more: false,
        });
        h.pipeline.dispatch_inbound(Inbound::CapNak {
            capabilities: parse_list("sasl"),
        });
        let out = sent(&h);
        assert_eq!(out.last(), Some(&Outbound::CapEnd));
        assert!(!out.iter().any(|m| matches!(m, Outbound::Authenticate(_))));
    }

    #[test]
    fn test_disconnect_disposes_state() {
        let h = harness(Some("pw"));
        negotiate(&h, "sasl");
        h.pipeline
            .dispatch_inbound(Inbound::Disconnected(crate::event::Termination::Eof));
        assert!(!h.pipeline.connection().locals().contains::<AuthState>());
    }
}
