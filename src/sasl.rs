//! Client-side SASL mechanisms.
//!
//! A [`SaslClient`] turns server challenges into responses. Mechanisms are
//! built by a [`MechanismFactory`] from a mechanism name and a set of
//! [`SaslCallbacks`] supplying the identity and credentials; a factory that
//! returns `None` makes the authenticator move on to the next mechanism.
//!
//! # Supported Mechanisms
//!
//! - **PLAIN**: username/password (RFC 4616)
//! - **EXTERNAL**: TLS client certificate
//! - **SCRAM-SHA-256**: challenge-response (RFC 7677), with the `scram` feature
//!
//! # Reference
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.2>
//! - RFC 4616 (PLAIN): <https://tools.ietf.org/html/rfc4616>
//! - RFC 7677 (SCRAM-SHA-256): <https://tools.ietf.org/html/rfc7677>

#[cfg(feature = "scram")]
mod scram;

use std::sync::Arc;

use crate::config::SaslCredentials;
use crate::error::SaslError;

#[cfg(feature = "scram")]
pub use self::scram::ScramClient;

/// One in-progress authentication exchange.
pub trait SaslClient: Send + Sync {
    /// Mechanism name as sent in `AUTHENTICATE <name>`.
    fn mechanism(&self) -> &str;

    /// Produce the response to a decoded challenge.
    fn evaluate(&mut self, challenge: &[u8]) -> Result<Vec<u8>, SaslError>;

    /// Whether the mechanism expects no further challenges.
    fn is_complete(&self) -> bool;

    /// Release any secrets held by the client.
    fn dispose(&mut self) {}
}

/// Identity and credential callbacks consulted when building a mechanism.
pub trait SaslCallbacks: Send + Sync {
    /// Authentication identity.
    fn name(&self) -> Option<String>;

    /// Password.
    fn password(&self) -> Option<String>;

    /// Authorization identity, when acting as someone else.
    fn authzid(&self) -> Option<String> {
        None
    }

    /// Realm to use. Accepts the mechanism's default by default.
    fn realm(&self, default: Option<&str>) -> Option<String> {
        default.map(str::to_owned)
    }
}

impl SaslCallbacks for SaslCredentials {
    fn name(&self) -> Option<String> {
        Some(self.account.clone()).filter(|a| !a.is_empty())
    }

    fn password(&self) -> Option<String> {
        self.password.clone()
    }

    fn authzid(&self) -> Option<String> {
        self.authzid.clone()
    }

    fn realm(&self, default: Option<&str>) -> Option<String> {
        self.realm.clone().or_else(|| default.map(str::to_owned))
    }
}

/// Builds mechanism clients by name.
pub trait MechanismFactory: Send + Sync {
    /// Create a client for `mechanism`, or `None` if it can't be used.
    fn create(
        &self,
        mechanism: &str,
        callbacks: Arc<dyn SaslCallbacks>,
    ) -> Option<Box<dyn SaslClient>>;
}

/// Factory for the mechanisms built into this crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultMechanisms;

impl MechanismFactory for DefaultMechanisms {
    fn create(
        &self,
        mechanism: &str,
        callbacks: Arc<dyn SaslCallbacks>,
    ) -> Option<Box<dyn SaslClient>> {
        match mechanism.to_ascii_uppercase().as_str() {
            "PLAIN" => PlainClient::from_callbacks(callbacks.as_ref())
                .map(|c| Box::new(c) as Box<dyn SaslClient>),
            "EXTERNAL" => Some(Box::new(ExternalClient::new(callbacks.authzid()))),
            #[cfg(feature = "scram")]
            "SCRAM-SHA-256" => ScramClient::from_callbacks(callbacks.as_ref())
                .map(|c| Box::new(c) as Box<dyn SaslClient>),
            _ => None,
        }
    }
}

/// PLAIN mechanism: `authzid NUL authcid NUL password` in one response.
pub struct PlainClient {
    authzid: String,
    authcid: String,
    password: String,
    complete: bool,
}

impl PlainClient {
    /// Create a PLAIN client.
    pub fn new(authzid: Option<String>, authcid: String, password: String) -> Self {
        Self {
            authzid: authzid.unwrap_or_default(),
            authcid,
            password,
            complete: false,
        }
    }

    /// Build from callbacks. `None` without a name or password.
    pub fn from_callbacks(callbacks: &dyn SaslCallbacks) -> Option<Self> {
        Some(Self::new(
            callbacks.authzid(),
            callbacks.name()?,
            callbacks.password()?,
        ))
    }
}

impl SaslClient for PlainClient {
    fn mechanism(&self) -> &str {
        "PLAIN"
    }

    fn evaluate(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, SaslError> {
        if self.complete {
            return Err(SaslError::UnexpectedChallenge("complete"));
        }
        self.complete = true;
        let payload = format!("{}\0{}\0{}", self.authzid, self.authcid, self.password);
        Ok(payload.into_bytes())
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn dispose(&mut self) {
        self.password.clear();
    }
}

impl std::fmt::Debug for PlainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainClient")
            .field("authcid", &self.authcid)
            .field("complete", &self.complete)
            .finish_non_exhaustive()
    }
}

/// EXTERNAL mechanism: identity comes from the TLS client certificate.
#[derive(Debug)]
pub struct ExternalClient {
    authzid: Option<String>,
    complete: bool,
}

impl ExternalClient {
    /// Create an EXTERNAL client, optionally naming an authorization identity.
    pub fn new(authzid: Option<String>) -> Self {
        Self {
            authzid,
            complete: false,
        }
    }
}

impl SaslClient for ExternalClient {
    fn mechanism(&self) -> &str {
        "EXTERNAL"
    }

    fn evaluate(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, SaslError> {
        if self.complete {
            return Err(SaslError::UnexpectedChallenge("complete"));
        }
        self.complete = true;
        Ok(self.authzid.clone().unwrap_or_default().into_bytes())
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Parse a comma-separated mechanism list, as in `sasl=` or 908.
pub fn parse_mechanisms(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(password: Option<&str>) -> Arc<dyn SaslCallbacks> {
        Arc::new(SaslCredentials {
            account: "jilles".into(),
            password: password.map(str::to_owned),
            ..SaslCredentials::default()
        })
    }

    #[test]
    fn test_plain_response() {
        let mut client = DefaultMechanisms
            .create("PLAIN", creds(Some("sesame")))
            .unwrap();
        assert_eq!(client.mechanism(), "PLAIN");
        assert!(!client.is_complete());
        assert_eq!(client.evaluate(b"").unwrap(), b"\0jilles\0sesame");
        assert!(client.is_complete());
        assert!(matches!(
            client.evaluate(b""),
            Err(SaslError::UnexpectedChallenge(_))
        ));
    }

    #[test]
    fn test_plain_needs_password() {
        assert!(DefaultMechanisms.create("PLAIN", creds(None)).is_none());
    }

    #[test]
    fn test_external_empty_response() {
        let mut client = DefaultMechanisms.create("external", creds(None)).unwrap();
        assert_eq!(client.evaluate(b"").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_unknown_mechanism() {
        assert!(DefaultMechanisms
            .create("DIGEST-MD5", creds(Some("x")))
            .is_none());
    }

    #[test]
    fn test_parse_mechanisms() {
        assert_eq!(
            parse_mechanisms("plain, EXTERNAL,,scram-sha-256"),
            vec!["PLAIN", "EXTERNAL", "SCRAM-SHA-256"]
        );
    }

    #[test]
    fn test_realm_defaults() {
        let c = SaslCredentials::default();
        assert_eq!(c.realm(Some("example.net")), Some("example.net".into()));
        let c = SaslCredentials {
            realm: Some("mine".into()),
            ..SaslCredentials::default()
        };
        assert_eq!(c.realm(Some("example.net")), Some("mine".into()));
    }
}
