//! CTCP decomposition of PRIVMSG/NOTICE bodies.

use crate::event::Inbound;
use crate::source::Source;
use crate::wire::render::CTCP_DELIM;

/// Split a `\x01COMMAND [argument]\x01` body. The closing delimiter is
/// optional. Returns `None` for bodies that aren't CTCP or have no command.
pub fn split(body: &str) -> Option<(&str, Option<&str>)> {
    let inner = body.strip_prefix(CTCP_DELIM)?;
    let inner = match inner.find(CTCP_DELIM) {
        Some(end) => &inner[..end],
        None => inner,
    };
    let (command, argument) = match inner.split_once(' ') {
        Some((command, argument)) => (command, Some(argument)),
        None => (inner, None),
    };
    if command.is_empty() {
        return None;
    }
    Some((command, argument))
}

/// Event for a PRIVMSG body.
pub(crate) fn privmsg(source: Option<Source>, target: String, body: &str) -> Inbound {
    let Some((command, argument)) = split(body) else {
        return Inbound::Message {
            source,
            target,
            message: body.to_owned(),
        };
    };

    if command.eq_ignore_ascii_case("ACTION") {
        Inbound::Action {
            source,
            target,
            text: argument.unwrap_or_default().to_owned(),
        }
    } else if command.eq_ignore_ascii_case("PING") {
        Inbound::CtcpPing {
            source,
            target,
            payload: argument.map(str::to_owned),
        }
    } else {
        Inbound::CtcpCommand {
            source,
            target,
            command: command.to_owned(),
            argument: argument.map(str::to_owned),
        }
    }
}

/// Event for a NOTICE body.
pub(crate) fn notice(source: Option<Source>, target: String, body: &str) -> Inbound {
    let Some((command, argument)) = split(body) else {
        return Inbound::Notice {
            source,
            target,
            message: body.to_owned(),
        };
    };

    if command.eq_ignore_ascii_case("PING") {
        Inbound::CtcpPong {
            source,
            target,
            payload: argument.map(str::to_owned),
        }
    } else {
        Inbound::CtcpResponse {
            source,
            target,
            command: command.to_owned(),
            argument: argument.map(str::to_owned),
        }
    }
}
