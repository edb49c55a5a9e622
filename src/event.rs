//! Events routed through the dispatch pipeline.
//!
//! Every event is either [`Inbound`] (produced by the parser or by the engine's
//! lifecycle, traversing handlers front to back) or an outbound
//! [`Event::Transmit`] carrying an [`Outbound`] command (traversing back to
//! front until the wire-adjacent handler renders it).

use crate::capability::Capability;
use crate::source::Source;

/// Traversal direction through the handler list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// From the wire towards the application: index 0 upwards.
    Inbound,
    /// From the application towards the wire: last index downwards.
    Outbound,
}

/// Outbound queue priority. Higher priorities are always drained first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Protocol-critical traffic (negotiation, keepalive replies).
    High,
    /// Ordinary traffic.
    Normal,
    /// Bulk traffic that may wait.
    Low,
}

impl Priority {
    pub(crate) const fn index(self) -> usize {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }
}

/// Why a connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// `terminate()` was called locally.
    Requested,
    /// The peer closed the stream.
    Eof,
    /// Reading failed.
    ReadFailed(String),
    /// Writing failed or a job callback failed.
    WriteFailed(String),
    /// The peer stopped acknowledging keepalive probes.
    Stalled,
}

/// SASL failure numerics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthFailure {
    /// 902 ERR_NICKLOCKED
    NickLocked,
    /// 904 ERR_SASLFAIL
    Failed,
    /// 905 ERR_SASLTOOLONG
    TooLong,
    /// 906 ERR_SASLABORTED
    Aborted,
    /// 907 ERR_SASLALREADY
    AlreadyAuthenticated,
    /// 462 ERR_ALREADYREGISTRED
    AlreadyRegistered,
}

impl AuthFailure {
    /// Whether another mechanism is worth trying after this failure.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Failed | Self::TooLong | Self::Aborted)
    }
}

/// An event received from the server, or a connection lifecycle change.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Inbound {
    /// The transport started.
    Connected,
    /// The transport ended.
    Disconnected(Termination),

    /// 001 RPL_WELCOME
    Welcome {
        /// Server that greeted us.
        server: Option<Source>,
        /// Nickname the server registered us under.
        nickname: String,
        /// Welcome text.
        text: String,
    },
    /// Server `PING`.
    ServerPing {
        /// Payload to echo back.
        payload: String,
    },
    /// Server `PONG`.
    ServerPong {
        /// Responding server.
        source: Option<Source>,
        /// Echoed payload.
        payload: String,
    },
    /// Server `ERROR`.
    ServerError {
        /// Error text.
        message: String,
    },

    /// `PRIVMSG` without CTCP framing.
    Message {
        /// Sender.
        source: Option<Source>,
        /// Channel or nickname the message was sent to.
        target: String,
        /// Message text.
        message: String,
    },
    /// `NOTICE` without CTCP framing.
    Notice {
        /// Sender.
        source: Option<Source>,
        /// Channel or nickname the notice was sent to.
        target: String,
        /// Notice text.
        message: String,
    },
    /// CTCP `ACTION` inside a `PRIVMSG`.
    Action {
        /// Sender.
        source: Option<Source>,
        /// Channel or nickname.
        target: String,
        /// Action text.
        text: String,
    },
    /// CTCP request inside a `PRIVMSG`.
    CtcpCommand {
        /// Sender.
        source: Option<Source>,
        /// Channel or nickname.
        target: String,
        /// CTCP command word.
        command: String,
        /// Argument text, if any.
        argument: Option<String>,
    },
    /// CTCP reply inside a `NOTICE`.
    CtcpResponse {
        /// Sender.
        source: Option<Source>,
        /// Channel or nickname.
        target: String,
        /// CTCP command word.
        command: String,
        /// Argument text, if any.
        argument: Option<String>,
    },
    /// CTCP `PING` request.
    CtcpPing {
        /// Sender.
        source: Option<Source>,
        /// Channel or nickname.
        target: String,
        /// Opaque payload.
        payload: Option<String>,
    },
    /// CTCP `PING` reply.
    CtcpPong {
        /// Sender.
        source: Option<Source>,
        /// Channel or nickname.
        target: String,
        /// Opaque payload.
        payload: Option<String>,
    },

    /// `JOIN`
    Join {
        /// Joining user.
        source: Option<Source>,
        /// Channel joined.
        channel: String,
    },
    /// `PART`
    Part {
        /// Departing user.
        source: Option<Source>,
        /// Channel left.
        channel: String,
        /// Part reason.
        reason: Option<String>,
    },
    /// `QUIT`
    Quit {
        /// Quitting user.
        source: Option<Source>,
        /// Quit reason.
        reason: Option<String>,
    },
    /// `NICK`
    NickChange {
        /// User changing nickname.
        source: Option<Source>,
        /// New nickname.
        nickname: String,
    },
    /// `KICK`
    Kick {
        /// Kicking user.
        source: Option<Source>,
        /// Channel.
        channel: String,
        /// Kicked nickname.
        target: String,
        /// Kick reason.
        reason: Option<String>,
    },
    /// `TOPIC`
    Topic {
        /// User changing the topic.
        source: Option<Source>,
        /// Channel.
        channel: String,
        /// New topic.
        topic: String,
    },
    /// `MODE`
    Mode {
        /// User or server changing modes.
        source: Option<Source>,
        /// Channel or nickname.
        target: String,
        /// Mode string followed by its arguments.
        modes: Vec<String>,
    },
    /// `INVITE`
    Invite {
        /// Inviting user.
        source: Option<Source>,
        /// Invited nickname.
        target: String,
        /// Channel.
        channel: String,
    },
    /// `AWAY` (away-notify)
    Away {
        /// User.
        source: Option<Source>,
        /// Away message; `None` when returning.
        message: Option<String>,
    },
    /// `ACCOUNT` (account-notify)
    Account {
        /// User.
        source: Option<Source>,
        /// Account name; `None` when logged out.
        account: Option<String>,
    },

    /// 324 RPL_CHANNELMODEIS
    ChannelModes {
        /// Channel.
        channel: String,
        /// Mode string followed by its arguments.
        modes: Vec<String>,
    },
    /// 329 RPL_CREATIONTIME
    ChannelCreated {
        /// Channel.
        channel: String,
        /// Unix timestamp.
        timestamp: i64,
    },
    /// 331 RPL_NOTOPIC
    NoTopic {
        /// Channel.
        channel: String,
    },
    /// 332 RPL_TOPIC
    ChannelTopic {
        /// Channel.
        channel: String,
        /// Current topic.
        topic: String,
    },
    /// 333 RPL_TOPICWHOTIME
    TopicInfo {
        /// Channel.
        channel: String,
        /// Who set the topic.
        setter: String,
        /// Unix timestamp.
        timestamp: i64,
    },
    /// 353 RPL_NAMREPLY
    Names {
        /// Channel.
        channel: String,
        /// Nicknames, with any membership prefixes.
        names: Vec<String>,
    },
    /// 366 RPL_ENDOFNAMES
    EndOfNames {
        /// Channel.
        channel: String,
    },
    /// 375 RPL_MOTDSTART
    MotdStart {
        /// Header text.
        text: String,
    },
    /// 372 RPL_MOTD
    MotdLine {
        /// One line of the message of the day.
        text: String,
    },
    /// 376 RPL_ENDOFMOTD
    MotdEnd,
    /// 433 ERR_NICKNAMEINUSE
    NicknameInUse {
        /// Nickname that was refused.
        nickname: String,
    },

    /// `CAP LS`
    CapList {
        /// Offered capabilities on this line.
        capabilities: Vec<Capability>,
        /// Whether more `LS` lines follow.
        more: bool,
    },
    /// `CAP ACK`
    CapAck {
        /// Acknowledged capabilities.
        capabilities: Vec<Capability>,
    },
    /// `CAP NAK`
    CapNak {
        /// Rejected capabilities.
        capabilities: Vec<Capability>,
    },
    /// A complete, decoded `AUTHENTICATE` challenge.
    AuthenticationChallenge {
        /// Decoded challenge bytes; empty for `AUTHENTICATE +`.
        payload: Vec<u8>,
    },
    /// An `AUTHENTICATE` challenge that failed base64 decoding.
    MalformedChallenge {
        /// Decoder error text.
        error: String,
    },
    /// 900 RPL_LOGGEDIN, or an equivalent NickServ confirmation.
    LoggedIn {
        /// Account name.
        account: String,
    },
    /// 901 RPL_LOGGEDOUT
    LoggedOut,
    /// 902, 904-907 and 462 during authentication.
    AuthenticationFailed {
        /// Which failure.
        kind: AuthFailure,
        /// Server text.
        reason: String,
    },
    /// 903 RPL_SASLSUCCESS
    SaslSuccess,
    /// 908 RPL_SASLMECHS
    SaslMechanisms {
        /// Mechanisms the server accepts.
        mechanisms: Vec<String>,
    },
}

/// A command to send to the server.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Outbound {
    /// `CAP LS [version]`
    CapLs {
        /// Negotiation version, e.g. 302.
        version: Option<u32>,
    },
    /// `CAP REQ :<caps>`
    CapReq(Vec<String>),
    /// `CAP END`
    CapEnd,
    /// `AUTHENTICATE <param>`: a mechanism name, a payload chunk, `+` or `*`.
    Authenticate(String),
    /// `PASS`
    Pass(String),
    /// `NICK`
    Nick(String),
    /// `USER <username> 0 * :<realname>`
    User {
        /// Username (ident).
        username: String,
        /// Real name / GECOS.
        realname: String,
    },
    /// `PING :<payload>`
    Ping(String),
    /// `PONG :<payload>`
    Pong(String),
    /// `PRIVMSG`, split across lines by target.
    Privmsg {
        /// Recipients.
        targets: Vec<String>,
        /// Message text.
        message: String,
    },
    /// `NOTICE`, split across lines by target.
    Notice {
        /// Recipients.
        targets: Vec<String>,
        /// Notice text.
        message: String,
    },
    /// CTCP `ACTION`.
    Action {
        /// Recipients.
        targets: Vec<String>,
        /// Action text.
        text: String,
    },
    /// CTCP request in a `PRIVMSG`.
    Ctcp {
        /// Recipients.
        targets: Vec<String>,
        /// CTCP command word.
        command: String,
        /// Argument text.
        argument: Option<String>,
    },
    /// CTCP reply in a `NOTICE`.
    CtcpReply {
        /// Recipients.
        targets: Vec<String>,
        /// CTCP command word.
        command: String,
        /// Argument text.
        argument: Option<String>,
    },
    /// `JOIN`
    Join {
        /// Channels.
        channels: Vec<String>,
        /// Keys, positionally matching `channels`.
        keys: Vec<String>,
    },
    /// `PART`
    Part {
        /// Channels.
        channels: Vec<String>,
        /// Part reason.
        reason: Option<String>,
    },
    /// `QUIT`
    Quit(Option<String>),
    /// A preformatted line.
    Raw(String),
}

impl Outbound {
    /// Priority used when the sender doesn't pick one.
    pub fn default_priority(&self) -> Priority {
        match self {
            Self::CapLs { .. }
            | Self::CapReq(_)
            | Self::CapEnd
            | Self::Authenticate(_)
            | Self::Pass(_)
            | Self::Nick(_)
            | Self::User { .. }
            | Self::Pong(_) => Priority::High,
            _ => Priority::Normal,
        }
    }
}

/// One unit of work for the dispatch pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Traffic from the server or a lifecycle change.
    Received(Inbound),
    /// A command on its way to the wire.
    Transmit {
        /// What to send.
        message: Outbound,
        /// Queue to send it on.
        priority: Priority,
    },
}

impl Event {
    /// Wrap an outbound command with its default priority.
    pub fn transmit(message: Outbound) -> Self {
        let priority = message.default_priority();
        Self::Transmit { message, priority }
    }

    /// Which way this event travels through the handler list.
    pub fn direction(&self) -> Direction {
        match self {
            Self::Received(_) => Direction::Inbound,
            Self::Transmit { .. } => Direction::Outbound,
        }
    }

    /// The inbound payload, if any.
    pub fn inbound(&self) -> Option<&Inbound> {
        match self {
            Self::Received(inbound) => Some(inbound),
            Self::Transmit { .. } => None,
        }
    }

    /// The outbound payload, if any.
    pub fn outbound(&self) -> Option<&Outbound> {
        match self {
            Self::Transmit { message, .. } => Some(message),
            Self::Received(_) => None,
        }
    }
}

impl From<Inbound> for Event {
    fn from(inbound: Inbound) -> Self {
        Self::Received(inbound)
    }
}

impl From<Outbound> for Event {
    fn from(outbound: Outbound) -> Self {
        Self::transmit(outbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction() {
        assert_eq!(Event::from(Inbound::Connected).direction(), Direction::Inbound);
        assert_eq!(Event::from(Outbound::CapEnd).direction(), Direction::Outbound);
    }

    #[test]
    fn test_default_priority() {
        assert_eq!(Outbound::CapEnd.default_priority(), Priority::High);
        assert_eq!(Outbound::Pong("x".into()).default_priority(), Priority::High);
        let msg = Outbound::Privmsg {
            targets: vec!["#c".into()],
            message: "hi".into(),
        };
        assert_eq!(msg.default_priority(), Priority::Normal);
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
    }

    #[test]
    fn test_retryable_failures() {
        assert!(AuthFailure::Failed.is_retryable());
        assert!(AuthFailure::Aborted.is_retryable());
        assert!(!AuthFailure::AlreadyAuthenticated.is_retryable());
        assert!(!AuthFailure::NickLocked.is_retryable());
    }
}
