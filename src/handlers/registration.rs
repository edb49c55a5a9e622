//! Client registration: `PASS`, `NICK`, `USER` and nickname tracking.

use tracing::{debug, info};

use crate::connection::Local;
use crate::error::Result;
use crate::event::{Event, Inbound, Outbound, Priority};
use crate::pipeline::{Context, Flow, Handler};

/// Whether the server has welcomed us on this connection.
#[derive(Debug, Default)]
pub struct RegistrationState {
    welcomed: bool,
}

impl Local for RegistrationState {}

impl RegistrationState {
    /// Whether 001 has been received.
    pub fn is_welcomed(&self) -> bool {
        self.welcomed
    }
}

/// Registers the connection and keeps [`Connection::nickname`] current.
///
/// [`Connection::nickname`]: crate::connection::Connection::nickname
pub struct Registration {
    nickname: String,
    username: String,
    realname: String,
    password: Option<String>,
}

impl Registration {
    /// Handler name.
    pub const NAME: &'static str = "registration";

    /// Register with the given identity.
    pub fn new(
        nickname: impl Into<String>,
        username: impl Into<String>,
        realname: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            nickname: nickname.into(),
            username: username.into(),
            realname: realname.into(),
            password,
        }
    }
}

impl Handler for Registration {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle(&self, ctx: &Context<'_>, event: &mut Event) -> Result<Flow> {
        let Event::Received(inbound) = event else {
            return Ok(Flow::Continue);
        };
        let connection = ctx.connection();

        match inbound {
            Inbound::Connected => {
                connection.locals().insert(RegistrationState::default());
                if let Some(password) = &self.password {
                    ctx.send_with_priority(Outbound::Pass(password.clone()), Priority::High);
                }
                ctx.send_with_priority(Outbound::Nick(self.nickname.clone()), Priority::High);
                ctx.send_with_priority(
                    Outbound::User {
                        username: self.username.clone(),
                        realname: self.realname.clone(),
                    },
                    Priority::High,
                );
            }
            Inbound::Welcome { nickname, .. } => {
                info!(%nickname, "registered");
                connection.set_nickname(nickname.clone());
                connection
                    .locals()
                    .get_or_insert_with(RegistrationState::default, |s| s.welcomed = true);
            }
            Inbound::NicknameInUse { nickname } => {
                let welcomed = connection
                    .locals()
                    .with(|s: &RegistrationState| s.welcomed)
                    .unwrap_or(false);
                if !welcomed {
                    let retry = format!("{}_", nickname);
                    debug!(%nickname, %retry, "nickname in use, retrying");
                    ctx.send_with_priority(Outbound::Nick(retry), Priority::High);
                }
            }
            Inbound::NickChange {
                source: Some(source),
                nickname,
            } => {
                if source.nick().is_some_and(|old| connection.is_me(old)) {
                    connection.set_nickname(nickname.clone());
                }
            }
            Inbound::Disconnected(_) => {
                connection.locals().remove::<RegistrationState>();
            }
            _ => {}
        }
        Ok(Flow::Continue)
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("nickname", &self.nickname)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
