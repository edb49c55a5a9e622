//! NickServ password fallback for networks without SASL.

use tracing::info;

use crate::error::Result;
use crate::event::{Event, Inbound, Outbound, Priority};
use crate::negotiation::{AuthPhase, AuthState};
use crate::pipeline::{Context, Flow, Handler};

const NICKSERV: &str = "NickServ";
const REGISTERED: &str = "This nickname is registered";
const IDENTIFIED: &str = "You are now identified for";

/// Answers NickServ's "nickname is registered" notice with `IDENTIFY`, and
/// turns its confirmation into [`Inbound::LoggedIn`].
pub struct NickServIdentify {
    account: String,
    password: String,
}

impl NickServIdentify {
    /// Handler name.
    pub const NAME: &'static str = "nickserv-identify";

    /// Identify as `account` with `password`.
    pub fn new(account: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            password: password.into(),
        }
    }
}

/// Account named in `You are now identified for \x02name\x02.`
fn identified_account(message: &str) -> Option<String> {
    let (_, rest) = message.split_once(IDENTIFIED)?;
    let account: String = rest
        .trim()
        .trim_end_matches('.')
        .chars()
        .filter(|c| *c != '\x02')
        .collect();
    Some(account).filter(|a| !a.is_empty() && !a.contains(' '))
}

impl Handler for NickServIdentify {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle(&self, ctx: &Context<'_>, event: &mut Event) -> Result<Flow> {
        let Event::Received(Inbound::Notice {
            source: Some(source),
            message,
            ..
        }) = event
        else {
            return Ok(Flow::Continue);
        };
        if source.nick() != Some(NICKSERV) {
            return Ok(Flow::Continue);
        }

        if message.contains(REGISTERED) {
            let logged_in = ctx
                .connection()
                .locals()
                .with(|state: &AuthState| state.phase() == AuthPhase::Succeeded)
                .unwrap_or(false);
            if !logged_in {
                info!(account = %self.account, "identifying to NickServ");
                ctx.send_with_priority(
                    Outbound::Privmsg {
                        targets: vec![NICKSERV.to_owned()],
                        message: format!("IDENTIFY {} {}", self.account, self.password),
                    },
                    Priority::High,
                );
            }
        } else if message.contains(IDENTIFIED) {
            let account =
                identified_account(message).unwrap_or_else(|| self.account.clone());
            ctx.dispatch(Inbound::LoggedIn { account });
        }
        Ok(Flow::Continue)
    }
}

impl std::fmt::Debug for NickServIdentify {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NickServIdentify")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::testing::{sent, Harness};
    use crate::source::Source;

    fn notice(from: &str, message: &str) -> Inbound {
        Inbound::Notice {
            source: Source::parse(from),
            target: "bot".into(),
            message: message.into(),
        }
    }

    fn harness() -> Harness {
        let h = Harness::new();
        h.add(NickServIdentify::new("bot", "hunter2"));
        h
    }

    #[test]
    fn test_identify_on_request() {
        let h = harness();
        h.pipeline.dispatch_inbound(notice(
            "NickServ!NickServ@services.",
            "This nickname is registered. Please choose a different nickname.",
        ));
        assert_eq!(
            sent(&h),
            vec![Outbound::Privmsg {
                targets: vec!["NickServ".into()],
                message: "IDENTIFY bot hunter2".into(),
            }]
        );
    }

    #[test]
    fn test_other_sources_ignored() {
        let h = harness();
        h.pipeline.dispatch_inbound(notice(
            "nickserv!x@y",
            "This nickname is registered.",
        ));
        h.pipeline.dispatch_inbound(notice(
            "Impostor!x@y",
            "This nickname is registered.",
        ));
        assert!(sent(&h).is_empty());
    }

    #[test]
    fn test_skipped_after_sasl() {
        let h = harness();
        h.pipeline.connection().locals().insert(AuthState::default());
        h.pipeline
            .connection()
            .locals()
            .with_mut(|s: &mut AuthState| s.force_phase(AuthPhase::Succeeded));
        h.pipeline.dispatch_inbound(notice(
            "NickServ!NickServ@services.",
            "This nickname is registered.",
        ));
        assert!(sent(&h).is_empty());
    }

    #[test]
    fn test_identified_becomes_logged_in() {
        let h = harness();
        h.pipeline.dispatch_inbound(notice(
            "NickServ!NickServ@services.",
            "You are now identified for \x02botaccount\x02.",
        ));
        assert!(h.received().contains(&Inbound::LoggedIn {
            account: "botaccount".into()
        }));
    }

    #[test]
    fn test_identified_account_fallback() {
        assert_eq!(identified_account("You are now identified for"), None);
        assert_eq!(
            identified_account("You are now identified for bot."),
            Some("bot".into())
        );
    }
}
