//! Inbound line parser.
//!
//! [`parse`] turns one raw line (no terminator) into at most one [`Inbound`]
//! event. It never fails: lines that don't tokenize, unknown commands and
//! unregistered numerics all produce `None`, logged at `trace` only.
//!
//! `AUTHENTICATE` payloads are reassembled here. A 400-character payload is a
//! fragment and is buffered on the connection; the next shorter payload (or
//! `+`) completes the challenge, which is decoded and emitted once.

mod ctcp;
mod numeric;

use tracing::trace;

use crate::capability::parse_list;
use crate::connection::{Connection, Local};
use crate::event::Inbound;
use crate::source::Source;
use crate::wire::{decode_base64, tokenize, RawLine, SASL_CHUNK_SIZE};

pub use self::ctcp::split as split_ctcp;

/// Longest reassembled challenge, in base64 characters.
pub const MAX_CHALLENGE_LEN: usize = 8192;

/// Base64 fragments of an `AUTHENTICATE` challenge still being received.
#[derive(Debug, Default)]
pub struct ChallengeBuffer {
    encoded: String,
}

impl Local for ChallengeBuffer {
    fn dispose(&mut self) {
        self.encoded.clear();
    }
}

impl ChallengeBuffer {
    /// Whether fragments are pending.
    pub fn is_pending(&self) -> bool {
        !self.encoded.is_empty()
    }
}

type CommandFn = fn(&Connection, Option<Source>, &RawLine<'_>) -> Option<Inbound>;

static COMMANDS: &[(&str, CommandFn)] = &[
    ("PING", ping),
    ("PONG", pong),
    ("ERROR", error),
    ("PRIVMSG", privmsg),
    ("NOTICE", notice),
    ("JOIN", join),
    ("PART", part),
    ("QUIT", quit),
    ("NICK", nick),
    ("KICK", kick),
    ("TOPIC", topic),
    ("MODE", mode),
    ("INVITE", invite),
    ("AWAY", away),
    ("ACCOUNT", account),
    ("CAP", cap),
    ("AUTHENTICATE", authenticate),
];

/// Parse one line into an event.
pub fn parse(connection: &Connection, line: &[u8]) -> Option<Inbound> {
    let text = connection.decode(line);
    let Some(raw) = tokenize(&text) else {
        trace!(line = %text, "unparseable line");
        return None;
    };
    let source = raw.prefix.and_then(Source::parse);

    let event = match raw.numeric() {
        Some(code) => numeric::lookup(code).and_then(|f| f(source, &raw)),
        None => COMMANDS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(raw.command))
            .and_then(|(_, f)| f(connection, source, &raw)),
    };

    if event.is_none() {
        trace!(command = raw.command, "no event for line");
    }
    event
}

fn opt(raw: &RawLine<'_>, index: usize) -> Option<String> {
    raw.arg(index).map(str::to_owned)
}

fn ping(_: &Connection, _: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::ServerPing {
        payload: raw.params.last().copied().unwrap_or_default().to_owned(),
    })
}

// PONG [<server>] :<payload>
fn pong(_: &Connection, source: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::ServerPong {
        source,
        payload: raw.params.last().copied().unwrap_or_default().to_owned(),
    })
}

fn error(_: &Connection, _: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::ServerError {
        message: raw.params.last().copied().unwrap_or_default().to_owned(),
    })
}

fn privmsg(_: &Connection, source: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(ctcp::privmsg(source, opt(raw, 0)?, raw.arg(1)?))
}

fn notice(_: &Connection, source: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(ctcp::notice(source, opt(raw, 0)?, raw.arg(1)?))
}

fn join(_: &Connection, source: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::Join {
        source,
        channel: opt(raw, 0)?,
    })
}

fn part(_: &Connection, source: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::Part {
        source,
        channel: opt(raw, 0)?,
        reason: opt(raw, 1),
    })
}

fn quit(_: &Connection, source: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::Quit {
        source,
        reason: opt(raw, 0),
    })
}

fn nick(_: &Connection, source: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::NickChange {
        source,
        nickname: opt(raw, 0)?,
    })
}

fn kick(_: &Connection, source: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::Kick {
        source,
        channel: opt(raw, 0)?,
        target: opt(raw, 1)?,
        reason: opt(raw, 2),
    })
}

fn topic(_: &Connection, source: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::Topic {
        source,
        channel: opt(raw, 0)?,
        topic: opt(raw, 1).unwrap_or_default(),
    })
}

fn mode(_: &Connection, source: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::Mode {
        source,
        target: opt(raw, 0)?,
        modes: raw.params.iter().skip(1).map(|m| (*m).to_owned()).collect(),
    })
}

fn invite(_: &Connection, source: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::Invite {
        source,
        target: opt(raw, 0)?,
        channel: opt(raw, 1)?,
    })
}

fn away(_: &Connection, source: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::Away {
        source,
        message: opt(raw, 0),
    })
}

fn account(_: &Connection, source: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    let account = raw.arg(0)?;
    Some(Inbound::Account {
        source,
        account: (account != "*").then(|| account.to_owned()),
    })
}

// CAP <nick> LS [*] :<caps>
// CAP <nick> ACK :<caps>
// CAP <nick> NAK :<caps>
fn cap(_: &Connection, _: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    let subcommand = raw.arg(1)?;
    let list = raw.params.last().copied().filter(|_| raw.params.len() > 2)?;
    let capabilities = parse_list(list);

    if subcommand.eq_ignore_ascii_case("LS") {
        let more = raw.params.len() > 3 && raw.arg(2) == Some("*");
        Some(Inbound::CapList { capabilities, more })
    } else if subcommand.eq_ignore_ascii_case("ACK") {
        Some(Inbound::CapAck { capabilities })
    } else if subcommand.eq_ignore_ascii_case("NAK") {
        Some(Inbound::CapNak { capabilities })
    } else {
        trace!(subcommand, "ignoring CAP subcommand");
        None
    }
}

fn authenticate(conn: &Connection, _: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    let payload = raw.arg(0)?;
    let locals = conn.locals();

    if payload.len() == SASL_CHUNK_SIZE {
        let overflow = locals.get_or_insert_with(ChallengeBuffer::default, |buf| {
            if buf.encoded.len() + payload.len() > MAX_CHALLENGE_LEN {
                buf.encoded.clear();
                return true;
            }
            buf.encoded.push_str(payload);
            false
        });
        if overflow {
            return Some(Inbound::MalformedChallenge {
                error: format!("challenge longer than {MAX_CHALLENGE_LEN} characters"),
            });
        }
        trace!(buffered = payload.len(), "challenge fragment");
        return None;
    }

    let mut encoded = locals
        .with_mut(|buf: &mut ChallengeBuffer| std::mem::take(&mut buf.encoded))
        .unwrap_or_default();
    if payload != "+" {
        encoded.push_str(payload);
    }
    if encoded.is_empty() {
        return Some(Inbound::AuthenticationChallenge {
            payload: Vec::new(),
        });
    }

    Some(match decode_base64(&encoded) {
        Ok(payload) => Inbound::AuthenticationChallenge { payload },
        Err(e) => Inbound::MalformedChallenge {
            error: e.to_string(),
        },
    })
}
