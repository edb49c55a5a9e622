//! IRCv3 capability tokens and request filtering.
//!
//! A capability token on the wire has the form `[-][=][~]name[=value]`:
//!
//! - `-` marks the capability as being disabled
//! - `=` marks the capability as sticky (cannot be disabled)
//! - `~` marks the capability as requiring a client ACK
//!
//! # Reference
//! - IRCv3 Capability Negotiation: <https://ircv3.net/specs/extensions/capability-negotiation>

use std::fmt;
use std::str::FromStr;

/// Extensions this engine does not implement. They are never requested,
/// even if the application lists them as desired.
pub const UNSUPPORTED: &[&str] = &["batch", "cap-notify", "server-time", "userhost-in-names"];

/// Capabilities requested when the configuration does not name any.
pub const DEFAULT_CAPABILITIES: &[&str] = &[
    "multi-prefix",
    "sasl",
    "echo-message",
    "away-notify",
    "account-notify",
];

/// A single capability token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Capability {
    /// Capability name (e.g., "multi-prefix").
    pub name: String,
    /// Value attached with `name=value` (CAP 302), if any.
    pub value: Option<String>,
    /// `=` modifier.
    pub sticky: bool,
    /// `-` modifier.
    pub disable: bool,
    /// `~` modifier.
    pub ack_requested: bool,
}

impl Capability {
    /// Create a plain capability with no modifiers or value.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            sticky: false,
            disable: false,
            ack_requested: false,
        }
    }

    /// Parse one capability token. Returns `None` for an empty name.
    pub fn parse(token: &str) -> Option<Self> {
        let mut cap = Self::new(String::new());
        let mut rest = token;

        loop {
            match rest.as_bytes().first() {
                Some(b'-') => cap.disable = true,
                Some(b'=') => cap.sticky = true,
                Some(b'~') => cap.ack_requested = true,
                _ => break,
            }
            rest = &rest[1..];
        }

        let (name, value) = match rest.split_once('=') {
            Some((name, value)) => (name, Some(value.to_owned())),
            None => (rest, None),
        };
        if name.is_empty() {
            return None;
        }

        cap.name = name.to_owned();
        cap.value = value;
        Some(cap)
    }

    /// Whether this engine implements the capability at all.
    pub fn is_supported(&self) -> bool {
        !UNSUPPORTED.contains(&self.name.as_str())
    }
}

impl FromStr for Capability {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.disable {
            f.write_str("-")?;
        }
        if self.sticky {
            f.write_str("=")?;
        }
        if self.ack_requested {
            f.write_str("~")?;
        }
        f.write_str(&self.name)?;
        if let Some(value) = &self.value {
            write!(f, "={}", value)?;
        }
        Ok(())
    }
}

/// Parse a space-separated capability list, skipping empty tokens.
pub fn parse_list(list: &str) -> Vec<Capability> {
    list.split_whitespace().filter_map(Capability::parse).collect()
}

/// Intersect the server's offer with the desired names.
///
/// The result keeps the server's order and never contains an
/// [`UNSUPPORTED`] capability or a capability offered as disabled.
pub fn requestable<S: AsRef<str>>(offered: &[Capability], desired: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for cap in offered {
        if cap.disable || !cap.is_supported() {
            continue;
        }
        if !desired.iter().any(|d| d.as_ref() == cap.name) {
            continue;
        }
        if !out.contains(&cap.name) {
            out.push(cap.name.clone());
        }
    }
    out
}

/// Find a capability by name.
pub fn find<'a>(caps: &'a [Capability], name: &str) -> Option<&'a Capability> {
    caps.iter().find(|c| c.name == name)
}
