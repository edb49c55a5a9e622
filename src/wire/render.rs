//! Outbound rendering.
//!
//! Turns an [`Outbound`] command into one or more wire lines (no terminator).
//! Message-bearing commands addressed to several targets are split so that
//! `command + ' ' + targets + " :" + message` stays under
//! [`TARGET_LINE_BUDGET`] bytes; the target list is split, never the message.

use std::fmt;

use crate::error::{EngineError, Result};
use crate::event::{Inbound, Outbound};

/// Byte budget for one multi-target line, before the terminator.
pub const TARGET_LINE_BUDGET: usize = 256;

/// CTCP delimiter.
pub const CTCP_DELIM: char = '\x01';

/// Correlates a sent PRIVMSG/NOTICE with the server's echo of it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EmissionKey {
    /// `PRIVMSG` or `NOTICE`.
    pub command: &'static str,
    /// Canonicalized trailing text.
    pub message: String,
}

impl EmissionKey {
    /// Build a key, canonicalizing the message the way it goes on the wire.
    pub fn new(command: &'static str, message: &str) -> Self {
        Self {
            command,
            message: canonicalize(message),
        }
    }

    /// The key an inbound message would have if we sent it.
    pub fn for_inbound(event: &Inbound) -> Option<Self> {
        match event {
            Inbound::Message { message, .. } => Some(Self::new("PRIVMSG", message)),
            Inbound::Notice { message, .. } => Some(Self::new("NOTICE", message)),
            Inbound::Action { text, .. } => {
                Some(Self::new("PRIVMSG", &ctcp_frame("ACTION", Some(text))))
            }
            Inbound::CtcpCommand {
                command, argument, ..
            } => Some(Self::new("PRIVMSG", &ctcp_frame(command, argument.as_deref()))),
            Inbound::CtcpResponse {
                command, argument, ..
            } => Some(Self::new("NOTICE", &ctcp_frame(command, argument.as_deref()))),
            _ => None,
        }
    }
}

impl fmt::Display for EmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.command, self.message)
    }
}

/// Replace line-breaking bytes with spaces and drop trailing whitespace.
fn canonicalize(message: &str) -> String {
    message
        .chars()
        .map(|c| if matches!(c, '\r' | '\n' | '\0') { ' ' } else { c })
        .collect::<String>()
        .trim_end()
        .to_owned()
}

/// One rendered wire line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedLine {
    /// Line text without terminator.
    pub text: String,
    /// Echo correlation key, for PRIVMSG and NOTICE.
    pub emission_key: Option<EmissionKey>,
}

impl RenderedLine {
    fn plain(text: String) -> Self {
        Self {
            text,
            emission_key: None,
        }
    }
}

/// Wrap a CTCP command and optional argument in delimiters.
pub fn ctcp_frame(command: &str, argument: Option<&str>) -> String {
    match argument {
        Some(arg) => format!("{CTCP_DELIM}{command} {arg}{CTCP_DELIM}"),
        None => format!("{CTCP_DELIM}{command}{CTCP_DELIM}"),
    }
}

/// Whether a trailing parameter needs a `:` prefix.
fn needs_colon_prefix(trailing: &str) -> bool {
    trailing.is_empty() || trailing.contains(' ') || trailing.starts_with(':')
}

/// Write a command whose last argument gets a colon only when needed.
fn write_cmd(cmd: &str, args: &[&str]) -> String {
    let Some((trailing, middle)) = args.split_last() else {
        return cmd.to_owned();
    };
    let mut line = String::from(cmd);
    for param in middle {
        line.push(' ');
        line.push_str(param);
    }
    line.push(' ');
    if needs_colon_prefix(trailing) {
        line.push(':');
    }
    line.push_str(trailing);
    line
}

/// Write a command with a freeform (always colon-prefixed) trailing argument.
fn write_cmd_freeform(cmd: &str, args: &[&str]) -> String {
    let Some((trailing, middle)) = args.split_last() else {
        return cmd.to_owned();
    };
    let mut line = String::from(cmd);
    for arg in middle {
        line.push(' ');
        line.push_str(arg);
    }
    line.push_str(" :");
    line.push_str(trailing);
    line
}

/// Group `targets` into comma-joined lists so that each
/// `command + ' ' + targets + " :" + message` stays under the budget.
///
/// A single target that overflows on its own still gets a line of its own.
pub fn split_targets(command: &str, targets: &[String], message: &str) -> Vec<String> {
    let fixed = command.len() + 1 + 2 + message.len();
    let mut groups = Vec::new();
    let mut current = String::new();

    for target in targets.iter().filter(|t| !t.is_empty()) {
        let extra = if current.is_empty() {
            target.len()
        } else {
            target.len() + 1
        };
        if !current.is_empty() && fixed + current.len() + extra >= TARGET_LINE_BUDGET {
            groups.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(',');
        }
        current.push_str(target);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn render_message(
    command: &'static str,
    targets: &[String],
    message: &str,
) -> Result<Vec<RenderedLine>> {
    let groups = split_targets(command, targets, message);
    if groups.is_empty() {
        return Err(EngineError::NoTargets { command });
    }
    let key = EmissionKey::new(command, message);
    Ok(groups
        .into_iter()
        .map(|group| RenderedLine {
            text: write_cmd_freeform(command, &[&group, message]),
            emission_key: Some(key.clone()),
        })
        .collect())
}

/// Render an outbound command into wire lines.
///
/// Fails for message-bearing commands without targets or without a body.
pub fn render(outbound: &Outbound) -> Result<Vec<RenderedLine>> {
    let line = match outbound {
        Outbound::Privmsg { targets, message } => {
            if message.is_empty() {
                return Err(EngineError::EmptyMessage { command: "PRIVMSG" });
            }
            return render_message("PRIVMSG", targets, message);
        }
        Outbound::Notice { targets, message } => {
            if message.is_empty() {
                return Err(EngineError::EmptyMessage { command: "NOTICE" });
            }
            return render_message("NOTICE", targets, message);
        }
        Outbound::Action { targets, text } => {
            return render_message("PRIVMSG", targets, &ctcp_frame("ACTION", Some(text)));
        }
        Outbound::Ctcp {
            targets,
            command,
            argument,
        } => {
            if command.is_empty() {
                return Err(EngineError::EmptyMessage { command: "PRIVMSG" });
            }
            let body = ctcp_frame(command, argument.as_deref());
            return render_message("PRIVMSG", targets, &body);
        }
        Outbound::CtcpReply {
            targets,
            command,
            argument,
        } => {
            if command.is_empty() {
                return Err(EngineError::EmptyMessage { command: "NOTICE" });
            }
            let body = ctcp_frame(command, argument.as_deref());
            return render_message("NOTICE", targets, &body);
        }
        Outbound::CapLs { version: Some(v) } => format!("CAP LS {v}"),
        Outbound::CapLs { version: None } => "CAP LS".to_owned(),
        Outbound::CapReq(caps) => write_cmd_freeform("CAP REQ", &[&caps.join(" ")]),
        Outbound::CapEnd => "CAP END".to_owned(),
        Outbound::Authenticate(param) => write_cmd("AUTHENTICATE", &[param]),
        Outbound::Pass(p) => write_cmd("PASS", &[p]),
        Outbound::Nick(n) => write_cmd("NICK", &[n]),
        Outbound::User { username, realname } => {
            write_cmd_freeform("USER", &[username, "0", "*", realname])
        }
        Outbound::Ping(p) => write_cmd("PING", &[p]),
        Outbound::Pong(p) => write_cmd_freeform("PONG", &[p]),
        Outbound::Join { channels, keys } => {
            if channels.is_empty() {
                return Err(EngineError::NoTargets { command: "JOIN" });
            }
            let channels = channels.join(",");
            if keys.is_empty() {
                write_cmd("JOIN", &[&channels])
            } else {
                write_cmd("JOIN", &[&channels, &keys.join(",")])
            }
        }
        Outbound::Part { channels, reason } => {
            if channels.is_empty() {
                return Err(EngineError::NoTargets { command: "PART" });
            }
            let channels = channels.join(",");
            match reason {
                Some(r) => write_cmd_freeform("PART", &[&channels, r]),
                None => write_cmd("PART", &[&channels]),
            }
        }
        Outbound::Quit(Some(reason)) => write_cmd_freeform("QUIT", &[reason]),
        Outbound::Quit(None) => "QUIT".to_owned(),
        Outbound::Raw(line) => line.clone(),
    };
    Ok(vec![RenderedLine::plain(line)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(outbound: &Outbound) -> Vec<String> {
        render(outbound)
            .unwrap()
            .into_iter()
            .map(|l| l.text)
            .collect()
    }

    #[test]
    fn test_render_privmsg() {
        let lines = render(&Outbound::Privmsg {
            targets: vec!["#chan".into()],
            message: "hello world".into(),
        })
        .unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "PRIVMSG #chan :hello world");
        assert_eq!(
            lines[0].emission_key,
            Some(EmissionKey::new("PRIVMSG", "hello world"))
        );
    }

    #[test]
    fn test_render_registration() {
        assert_eq!(texts(&Outbound::Nick("bot".into())), vec!["NICK bot"]);
        assert_eq!(
            texts(&Outbound::User {
                username: "bot".into(),
                realname: "A Bot".into()
            }),
            vec!["USER bot 0 * :A Bot"]
        );
        assert_eq!(texts(&Outbound::CapLs { version: Some(302) }), vec!["CAP LS 302"]);
        assert_eq!(
            texts(&Outbound::CapReq(vec!["sasl".into(), "multi-prefix".into()])),
            vec!["CAP REQ :sasl multi-prefix"]
        );
        assert_eq!(texts(&Outbound::Authenticate("+".into())), vec!["AUTHENTICATE +"]);
        assert_eq!(texts(&Outbound::Pong("abc".into())), vec!["PONG :abc"]);
    }

    #[test]
    fn test_render_action() {
        assert_eq!(
            texts(&Outbound::Action {
                targets: vec!["#c".into()],
                text: "waves".into()
            }),
            vec!["PRIVMSG #c :\x01ACTION waves\x01"]
        );
    }

    #[test]
    fn test_render_join_with_keys() {
        assert_eq!(
            texts(&Outbound::Join {
                channels: vec!["#a".into(), "#b".into()],
                keys: vec!["k".into()]
            }),
            vec!["JOIN #a,#b k"]
        );
    }

    #[test]
    fn test_reject_empty() {
        assert!(matches!(
            render(&Outbound::Privmsg {
                targets: vec![],
                message: "hi".into()
            }),
            Err(EngineError::NoTargets { command: "PRIVMSG" })
        ));
        assert!(matches!(
            render(&Outbound::Notice {
                targets: vec!["x".into()],
                message: String::new()
            }),
            Err(EngineError::EmptyMessage { command: "NOTICE" })
        ));
    }

    #[test]
    fn test_split_targets_under_budget() {
        let targets: Vec<String> = (0..40).map(|i| format!("#channel{i:02}")).collect();
        let message = "a message of moderate length";
        let groups = split_targets("PRIVMSG", &targets, message);
        assert!(groups.len() > 1);
        for group in &groups {
            let line_len = "PRIVMSG".len() + 1 + group.len() + 2 + message.len();
            assert!(line_len < TARGET_LINE_BUDGET, "{line_len}");
        }
        let rejoined: Vec<&str> = groups.iter().flat_map(|g| g.split(',')).collect();
        assert_eq!(rejoined.len(), targets.len());
        assert_eq!(rejoined[0], "#channel00");
        assert_eq!(rejoined[39], "#channel39");
    }

    #[test]
    fn test_split_oversized_single_target() {
        let message = "x".repeat(300);
        let groups = split_targets("NOTICE", &["a".into(), "b".into()], &message);
        assert_eq!(groups, vec!["a", "b"]);
    }

    #[test]
    fn test_emission_key_for_inbound() {
        let action = Inbound::Action {
            source: None,
            target: "#c".into(),
            text: "waves".into(),
        };
        assert_eq!(
            EmissionKey::for_inbound(&action),
            Some(EmissionKey::new("PRIVMSG", "\x01ACTION waves\x01"))
        );
        assert_eq!(EmissionKey::new("PRIVMSG", "hi \r\n"), EmissionKey::new("PRIVMSG", "hi"));
    }
}
