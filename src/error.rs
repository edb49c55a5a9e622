//! Error types for the IRC client engine.
//!
//! This module defines the engine-wide error type along with the
//! narrower SASL error raised while evaluating authentication exchanges.

use thiserror::Error;

/// Convenience type alias for Results using [`EngineError`].
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Top-level engine errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream handed to the transport has no connected peer.
    #[error("socket is not connected")]
    NotConnected,

    /// The transport was started twice.
    #[error("transport already started")]
    AlreadyStarted,

    /// The configured character encoding label is not recognized.
    #[error("unknown character encoding: {0}")]
    UnknownEncoding(String),

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A message-bearing send was requested with an empty target list.
    #[error("{command} requires at least one target")]
    NoTargets {
        /// The command that was being rendered.
        command: &'static str,
    },

    /// A message-bearing send was requested with an empty body.
    #[error("{command} requires a non-empty message")]
    EmptyMessage {
        /// The command that was being rendered.
        command: &'static str,
    },

    /// SASL evaluation failed.
    #[error("sasl error: {0}")]
    Sasl(#[from] SaslError),

    /// A handler reported a failure.
    #[error("handler failed: {0}")]
    Handler(String),

    /// A registration position named a handler that isn't in the pipeline.
    #[error("no handler named {0:?}")]
    UnknownHandler(String),
}

/// Errors raised by SASL mechanisms and payload decoding.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SaslError {
    /// Base64 decoding of a challenge failed.
    #[error("invalid base64 payload: {0}")]
    Decode(String),

    /// A challenge was not valid UTF-8 where text was expected.
    #[error("challenge is not valid utf-8")]
    InvalidEncoding,

    /// The mechanism received a challenge it did not expect.
    #[error("unexpected challenge in state {0}")]
    UnexpectedChallenge(&'static str),

    /// Server nonce doesn't match client nonce prefix.
    #[error("server nonce doesn't match client nonce")]
    NonceMismatch,

    /// A required attribute was missing from a server message.
    #[error("missing attribute '{0}' in server message")]
    MissingAttribute(char),

    /// Invalid iteration count.
    #[error("invalid iteration count")]
    InvalidIterations,

    /// The server reported an error in its final message.
    #[error("server rejected authentication: {0}")]
    ServerError(String),

    /// Server signature verification failed.
    #[error("server verification failed")]
    ServerVerificationFailed,

    /// A cryptographic primitive failed.
    #[error("crypto failure: {0}")]
    Crypto(String),
}

impl From<base64::DecodeError> for SaslError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}
