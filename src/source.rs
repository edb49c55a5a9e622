//! Message source (prefix) types.

use std::fmt;

/// The origin of an inbound line, taken from its `:prefix`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    /// A bare server name.
    Server(String),
    /// A user, `nick[!user][@host]`.
    User {
        /// Nickname.
        nick: String,
        /// Username (ident).
        user: Option<String>,
        /// Hostname.
        host: Option<String>,
    },
}

impl Source {
    /// Parse a prefix without its leading `:`.
    ///
    /// A prefix with neither `!` nor `@` is a server name when it contains a
    /// dot and a nickname otherwise.
    pub fn parse(prefix: &str) -> Option<Self> {
        if prefix.is_empty() {
            return None;
        }

        let (rest, host) = match prefix.split_once('@') {
            Some((rest, host)) => (rest, Some(host.to_owned())),
            None => (prefix, None),
        };
        let (nick, user) = match rest.split_once('!') {
            Some((nick, user)) => (nick, Some(user.to_owned())),
            None => (rest, None),
        };

        if user.is_none() && host.is_none() && nick.contains('.') {
            return Some(Self::Server(nick.to_owned()));
        }
        if nick.is_empty() {
            return None;
        }
        Some(Self::User {
            nick: nick.to_owned(),
            user,
            host,
        })
    }

    /// The nickname, if this source is a user.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Self::User { nick, .. } => Some(nick),
            Self::Server(_) => None,
        }
    }

    /// The name as it would be addressed: a nickname or a server name.
    pub fn name(&self) -> &str {
        match self {
            Self::User { nick, .. } => nick,
            Self::Server(name) => name,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(name) => f.write_str(name),
            Self::User { nick, user, host } => {
                f.write_str(nick)?;
                if let Some(user) = user {
                    write!(f, "!{}", user)?;
                }
                if let Some(host) = host {
                    write!(f, "@{}", host)?;
                }
                Ok(())
            }
        }
    }
}
