//! Numeric reply table.

use crate::event::{AuthFailure, Inbound};
use crate::source::Source;
use crate::wire::RawLine;

type NumericFn = fn(Option<Source>, &RawLine<'_>) -> Option<Inbound>;

/// Numerics that produce events. Anything else is dropped.
static NUMERICS: &[(u16, NumericFn)] = &[
    (1, welcome),
    (324, channel_modes),
    (329, channel_created),
    (331, no_topic),
    (332, channel_topic),
    (333, topic_info),
    (353, names),
    (366, end_of_names),
    (372, motd_line),
    (375, motd_start),
    (376, motd_end),
    (433, nickname_in_use),
    (462, already_registered),
    (900, logged_in),
    (901, logged_out),
    (902, nick_locked),
    (903, sasl_success),
    (904, sasl_failed),
    (905, sasl_too_long),
    (906, sasl_aborted),
    (907, sasl_already),
    (908, sasl_mechanisms),
];

pub(crate) fn lookup(code: u16) -> Option<NumericFn> {
    NUMERICS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, f)| *f)
}

fn last(raw: &RawLine<'_>) -> String {
    raw.params.last().copied().unwrap_or_default().to_owned()
}

fn arg(raw: &RawLine<'_>, index: usize) -> Option<String> {
    raw.arg(index).map(str::to_owned)
}

fn welcome(server: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::Welcome {
        server,
        nickname: arg(raw, 0)?,
        text: last(raw),
    })
}

fn channel_modes(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::ChannelModes {
        channel: arg(raw, 1)?,
        modes: raw.params.iter().skip(2).map(|m| (*m).to_owned()).collect(),
    })
}

fn channel_created(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::ChannelCreated {
        channel: arg(raw, 1)?,
        timestamp: raw.arg(2)?.parse().ok()?,
    })
}

fn no_topic(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::NoTopic {
        channel: arg(raw, 1)?,
    })
}

fn channel_topic(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::ChannelTopic {
        channel: arg(raw, 1)?,
        topic: arg(raw, 2)?,
    })
}

fn topic_info(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::TopicInfo {
        channel: arg(raw, 1)?,
        setter: arg(raw, 2)?,
        timestamp: raw.arg(3)?.parse().ok()?,
    })
}

// <me> <symbol> <channel> :<names>
fn names(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::Names {
        channel: arg(raw, 2)?,
        names: raw.arg(3)?.split_whitespace().map(str::to_owned).collect(),
    })
}

fn end_of_names(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::EndOfNames {
        channel: arg(raw, 1)?,
    })
}

fn motd_line(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::MotdLine { text: last(raw) })
}

fn motd_start(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::MotdStart { text: last(raw) })
}

fn motd_end(_: Option<Source>, _: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::MotdEnd)
}

fn nickname_in_use(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::NicknameInUse {
        nickname: arg(raw, 1)?,
    })
}

// <me> <mask> <account> :<text>
fn logged_in(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::LoggedIn {
        account: arg(raw, 2)?,
    })
}

fn logged_out(_: Option<Source>, _: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::LoggedOut)
}

fn sasl_success(_: Option<Source>, _: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::SaslSuccess)
}

fn failed(kind: AuthFailure, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::AuthenticationFailed {
        kind,
        reason: last(raw),
    })
}

fn already_registered(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    failed(AuthFailure::AlreadyRegistered, raw)
}

fn nick_locked(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    failed(AuthFailure::NickLocked, raw)
}

fn sasl_failed(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    failed(AuthFailure::Failed, raw)
}

fn sasl_too_long(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    failed(AuthFailure::TooLong, raw)
}

fn sasl_aborted(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    failed(AuthFailure::Aborted, raw)
}

fn sasl_already(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    failed(AuthFailure::AlreadyAuthenticated, raw)
}

// <me> <mechanisms> :are available SASL mechanisms
fn sasl_mechanisms(_: Option<Source>, raw: &RawLine<'_>) -> Option<Inbound> {
    Some(Inbound::SaslMechanisms {
        mechanisms: raw
            .arg(1)?
            .split(',')
            .filter(|m| !m.is_empty())
            .map(str::to_owned)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::tokenize;

    fn parse(line: &str) -> Option<Inbound> {
        let raw = tokenize(line)?;
        let source = raw.prefix.and_then(Source::parse);
        lookup(raw.numeric()?)?(source, &raw)
    }

    #[test]
    fn test_welcome() {
        let event = parse(":irc.example.net 001 bot :Welcome to the network").unwrap();
        assert_eq!(
            event,
            Inbound::Welcome {
                server: Some(Source::Server("irc.example.net".into())),
                nickname: "bot".into(),
                text: "Welcome to the network".into(),
            }
        );
    }

    #[test]
    fn test_names() {
        let event = parse(":s 353 bot = #chan :@op +voice plain").unwrap();
        assert_eq!(
            event,
            Inbound::Names {
                channel: "#chan".into(),
                names: vec!["@op".into(), "+voice".into(), "plain".into()],
            }
        );
    }

    #[test]
    fn test_sasl_numerics() {
        assert_eq!(
            parse(":s 900 bot bot!u@h account :You are now logged in as account"),
            Some(Inbound::LoggedIn {
                account: "account".into()
            })
        );
        assert_eq!(parse(":s 903 bot :SASL authentication successful"), Some(Inbound::SaslSuccess));
        assert!(matches!(
            parse(":s 904 bot :SASL authentication failed"),
            Some(Inbound::AuthenticationFailed {
                kind: AuthFailure::Failed,
                ..
            })
        ));
        assert_eq!(
            parse(":s 908 bot PLAIN,EXTERNAL :are available SASL mechanisms"),
            Some(Inbound::SaslMechanisms {
                mechanisms: vec!["PLAIN".into(), "EXTERNAL".into()]
            })
        );
    }

    #[test]
    fn test_bad_timestamp_dropped() {
        assert!(parse(":s 329 bot #chan notanumber").is_none());
        assert!(parse(":s 329 bot #chan 1700000000").is_some());
    }

    #[test]
    fn test_unknown_numeric() {
        assert!(parse(":s 005 bot CHANTYPES=# :are supported").is_none());
    }

    #[test]
    fn test_missing_params_dropped() {
        assert!(parse(":s 332").is_none());
        assert!(parse(":s 001").is_none());
    }
}
