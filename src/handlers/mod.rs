//! Built-in handlers that sit between the wire and the negotiators.
//!
//! The engine installs them at the front of the pipeline in this order:
//!
//! | Index | Handler | Role |
//! |---|---|---|
//! | 0 | [`TransportSink`] | renders outbound commands into transport jobs |
//! | 1 | [`KeepaliveAck`] | feeds `PONG Q<n>` into the flow-control window |
//! | 2 | [`PingResponder`] | answers server `PING` |
//! | 3 | [`EchoFilter`] | drops `echo-message` echoes of our own sends |
//!
//! [`Registration`] follows the negotiators.

mod echo;
mod keepalive;
mod registration;
mod sink;

pub use self::echo::EchoFilter;
pub use self::keepalive::{KeepaliveAck, PingResponder};
pub use self::registration::{Registration, RegistrationState};
pub use self::sink::TransportSink;
