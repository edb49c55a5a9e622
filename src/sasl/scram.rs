//! SCRAM-SHA-256 client (RFC 5802 / RFC 7677).
//!
//! The exchange runs in three steps:
//! 1. the client sends `n,,n=<user>,r=<nonce>`
//! 2. the server answers with its nonce, salt and iteration count; the client
//!    derives its keys and sends the proof
//! 3. the server sends its signature, which the client verifies
//!
//! Channel binding is not supported (`n,,` GS2 header).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::{SaslCallbacks, SaslClient};
use crate::error::SaslError;

type HmacSha256 = Hmac<Sha256>;

const NONCE_BYTES: usize = 18;
const GS2_HEADER: &str = "n,,";
// base64("n,,")
const CHANNEL_BINDING: &str = "biws";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Initial,
    ClientFirstSent,
    ClientFinalSent,
    Complete,
}

/// SCRAM-SHA-256 client state machine.
pub struct ScramClient {
    username: String,
    password: String,
    client_nonce: String,
    client_first_bare: String,
    server_signature: Vec<u8>,
    step: Step,
}

impl ScramClient {
    /// Create a client with a random nonce.
    pub fn new(username: &str, password: &str) -> Result<Self, SaslError> {
        Ok(Self::with_nonce(username, password, generate_nonce()?))
    }

    /// Create a client with a caller-supplied nonce.
    pub fn with_nonce(username: &str, password: &str, nonce: String) -> Self {
        Self {
            username: escape_username(username),
            password: password.to_owned(),
            client_nonce: nonce,
            client_first_bare: String::new(),
            server_signature: Vec::new(),
            step: Step::Initial,
        }
    }

    /// Build from callbacks. `None` without a name or password, or if no
    /// nonce could be generated.
    pub fn from_callbacks(callbacks: &dyn SaslCallbacks) -> Option<Self> {
        let name = callbacks.name()?;
        let password = callbacks.password()?;
        match Self::new(&name, &password) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "cannot create SCRAM-SHA-256 client");
                None
            }
        }
    }

    fn client_first(&mut self) -> Vec<u8> {
        self.client_first_bare = format!("n={},r={}", self.username, self.client_nonce);
        self.step = Step::ClientFirstSent;
        format!("{}{}", GS2_HEADER, self.client_first_bare).into_bytes()
    }

    fn client_final(&mut self, server_first: &str) -> Result<Vec<u8>, SaslError> {
        let attrs = attributes(server_first)?;
        let nonce = require(&attrs, 'r')?;
        let salt = STANDARD.decode(require(&attrs, 's')?)?;
        let iterations: u32 = require(&attrs, 'i')?
            .parse()
            .map_err(|_| SaslError::InvalidIterations)?;
        if iterations == 0 {
            return Err(SaslError::InvalidIterations);
        }
        if !nonce.starts_with(&self.client_nonce) || nonce.len() == self.client_nonce.len() {
            return Err(SaslError::NonceMismatch);
        }

        let mut salted = [0u8; 32];
        pbkdf2::pbkdf2::<HmacSha256>(self.password.as_bytes(), &salt, iterations, &mut salted)
            .map_err(|e| SaslError::Crypto(e.to_string()))?;

        let client_key = hmac(&salted, b"Client Key")?;
        let stored_key = Sha256::digest(&client_key);
        let without_proof = format!("c={},r={}", CHANNEL_BINDING, nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare, server_first, without_proof
        );
        let client_signature = hmac(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        let server_key = hmac(&salted, b"Server Key")?;
        self.server_signature = hmac(&server_key, auth_message.as_bytes())?;
        self.step = Step::ClientFinalSent;

        Ok(format!("{},p={}", without_proof, STANDARD.encode(proof)).into_bytes())
    }

    fn verify(&mut self, server_final: &str) -> Result<Vec<u8>, SaslError> {
        let attrs = attributes(server_final)?;
        if let Some(error) = find(&attrs, 'e') {
            return Err(SaslError::ServerError(error.to_owned()));
        }
        let signature = STANDARD.decode(require(&attrs, 'v')?)?;
        if !constant_time_eq(&signature, &self.server_signature) {
            return Err(SaslError::ServerVerificationFailed);
        }
        self.step = Step::Complete;
        Ok(Vec::new())
    }
}

impl SaslClient for ScramClient {
    fn mechanism(&self) -> &str {
        "SCRAM-SHA-256"
    }

    fn evaluate(&mut self, challenge: &[u8]) -> Result<Vec<u8>, SaslError> {
        match self.step {
            Step::Initial => Ok(self.client_first()),
            Step::ClientFirstSent => self.client_final(utf8(challenge)?),
            Step::ClientFinalSent => self.verify(utf8(challenge)?),
            Step::Complete => Err(SaslError::UnexpectedChallenge("complete")),
        }
    }

    fn is_complete(&self) -> bool {
        self.step == Step::Complete
    }

    fn dispose(&mut self) {
        self.password.clear();
        self.server_signature.clear();
    }
}

impl std::fmt::Debug for ScramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScramClient")
            .field("username", &self.username)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

fn generate_nonce() -> Result<String, SaslError> {
    let mut bytes = [0u8; NONCE_BYTES];
    getrandom::getrandom(&mut bytes).map_err(|e| SaslError::Crypto(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}

/// `=` and `,` are reserved in SCRAM attribute values.
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

fn utf8(challenge: &[u8]) -> Result<&str, SaslError> {
    std::str::from_utf8(challenge).map_err(|_| SaslError::InvalidEncoding)
}

fn attributes(message: &str) -> Result<Vec<(char, &str)>, SaslError> {
    message
        .split(',')
        .map(|part| {
            let malformed = SaslError::UnexpectedChallenge("malformed attribute");
            let (key, value) = part.split_once('=').ok_or(malformed.clone())?;
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(key), None) => Ok((key, value)),
                _ => Err(malformed),
            }
        })
        .collect()
}

fn find<'a>(attrs: &[(char, &'a str)], key: char) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn require<'a>(attrs: &[(char, &'a str)], key: char) -> Result<&'a str, SaslError> {
    find(attrs, key).ok_or(SaslError::MissingAttribute(key))
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SaslError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| SaslError::Crypto(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7677 section 3.
    const NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const SERVER_FIRST: &str = "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
    const CLIENT_FINAL: &str = "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=";
    const SERVER_FINAL: &str = "v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";

    fn client() -> ScramClient {
        ScramClient::with_nonce("user", "pencil", NONCE.to_owned())
    }

    #[test]
    fn test_rfc7677_exchange() {
        let mut scram = client();
        assert_eq!(scram.evaluate(b"").unwrap(), b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO");
        assert_eq!(
            scram.evaluate(SERVER_FIRST.as_bytes()).unwrap(),
            CLIENT_FINAL.as_bytes()
        );
        assert!(!scram.is_complete());
        assert!(scram.evaluate(SERVER_FINAL.as_bytes()).unwrap().is_empty());
        assert!(scram.is_complete());
    }

    #[test]
    fn test_bad_server_signature() {
        let mut scram = client();
        scram.evaluate(b"").unwrap();
        scram.evaluate(SERVER_FIRST.as_bytes()).unwrap();
        let forged = format!("v={}", STANDARD.encode([0u8; 32]));
        assert_eq!(
            scram.evaluate(forged.as_bytes()),
            Err(SaslError::ServerVerificationFailed)
        );
        assert!(!scram.is_complete());
    }

    #[test]
    fn test_server_error_attribute() {
        let mut scram = client();
        scram.evaluate(b"").unwrap();
        scram.evaluate(SERVER_FIRST.as_bytes()).unwrap();
        assert_eq!(
            scram.evaluate(b"e=invalid-proof"),
            Err(SaslError::ServerError("invalid-proof".into()))
        );
    }

    #[test]
    fn test_nonce_must_extend_ours() {
        let mut scram = client();
        scram.evaluate(b"").unwrap();
        assert_eq!(
            scram.evaluate(b"r=someoneelse,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096"),
            Err(SaslError::NonceMismatch)
        );

        let mut scram = client();
        scram.evaluate(b"").unwrap();
        let echoed = format!("r={},s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096", NONCE);
        assert_eq!(
            scram.evaluate(echoed.as_bytes()),
            Err(SaslError::NonceMismatch)
        );
    }

    #[test]
    fn test_missing_and_invalid_attributes() {
        let mut scram = client();
        scram.evaluate(b"").unwrap();
        let no_salt = format!("r={}x,i=4096", NONCE);
        assert_eq!(
            scram.evaluate(no_salt.as_bytes()),
            Err(SaslError::MissingAttribute('s'))
        );

        let mut scram = client();
        scram.evaluate(b"").unwrap();
        let zero = format!("r={}x,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=0", NONCE);
        assert_eq!(
            scram.evaluate(zero.as_bytes()),
            Err(SaslError::InvalidIterations)
        );
    }

    #[test]
    fn test_username_escaping() {
        let mut scram = ScramClient::with_nonce("a=b,c", "pw", "n".into());
        assert_eq!(scram.evaluate(b"").unwrap(), b"n,,n=a=3Db=2Cc,r=n");
    }

    #[test]
    fn test_random_nonce() {
        let a = ScramClient::new("u", "p").unwrap();
        let b = ScramClient::new("u", "p").unwrap();
        assert_eq!(a.client_nonce.len(), 24);
        assert_ne!(a.client_nonce, b.client_nonce);
    }
}
