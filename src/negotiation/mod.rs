//! Connection negotiation: IRCv3 capabilities, SASL and the NickServ fallback.
//!
//! Each negotiator is a pipeline [`Handler`](crate::pipeline::Handler) whose
//! progress lives in the connection's locals ([`CapState`], [`AuthState`]),
//! so one handler instance can serve successive connections.

mod cap;
mod nickserv;
mod sasl;

pub use self::cap::{CapNegotiator, CapPhase, CapState};
pub use self::nickserv::NickServIdentify;
pub use self::sasl::{AuthPhase, AuthState, SaslAuthenticator};
