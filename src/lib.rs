//! # slirc-engine
//!
//! A client-side IRC engine: a windowed line transport, a direction-aware
//! handler pipeline, a parser from wire lines to typed events, and IRCv3
//! capability and SASL negotiation.
//!
//! ## Features
//!
//! - Priority-queued, flow-controlled writer with `PING Q<n>` acknowledgments
//! - Re-entrant dispatch pipeline shared by inbound and outbound traffic
//! - Typed inbound events for commands, numerics and CTCP
//! - `CAP LS 302` negotiation with multi-line lists
//! - SASL PLAIN, EXTERNAL and (with `scram`) SCRAM-SHA-256, plus a NickServ
//!   fallback
//! - Per-connection typed state with dispose-on-remove
//!
//! ## Quick Start
//!
//! ```no_run
//! use slirc_engine::{EngineBuilder, EngineConfig, Event, Flow, FnHandler, Inbound, Position};
//!
//! # async fn run() -> slirc_engine::Result<()> {
//! let engine = EngineBuilder::new(EngineConfig::default())
//!     .handler(
//!         FnHandler::new("printer", |_: &slirc_engine::Context<'_>, event: &mut Event| {
//!             if let Event::Received(Inbound::Message { target, message, .. }) = event {
//!                 println!("{}: {}", target, message);
//!             }
//!             Ok(Flow::Continue)
//!         }),
//!         Position::Last,
//!     )
//!     .connect("irc.libera.chat:6667")
//!     .await?;
//! engine.closed().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Parsing Without a Connection
//!
//! ```rust
//! use slirc_engine::{parser, Connection, Inbound};
//!
//! let conn = Connection::new(None, encoding::UTF_8, "me");
//! let event = parser::parse(&conn, b":nick!u@h PRIVMSG #rust :\x01ACTION waves\x01");
//! assert!(matches!(event, Some(Inbound::Action { text, .. }) if text == "waves"));
//! ```

#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod capability;
pub mod casemap;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod negotiation;
pub mod parser;
pub mod pipeline;
pub mod sasl;
pub mod source;
pub mod wire;

#[cfg(feature = "tokio")]
pub mod engine;
#[cfg(feature = "tokio")]
pub mod handlers;
#[cfg(feature = "tokio")]
pub mod transport;

pub use self::capability::Capability;
pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::config::{EngineConfig, SaslCredentials, StallPolicy, TransportConfig};
pub use self::connection::{Connection, Local, Locals};
pub use self::error::{EngineError, Result, SaslError};
pub use self::event::{
    AuthFailure, Direction, Event, Inbound, Outbound, Priority, Termination,
};
pub use self::negotiation::{AuthPhase, AuthState, CapPhase, CapState};
pub use self::pipeline::{Context, Flow, FnHandler, Handler, Pipeline, Position};
pub use self::sasl::{DefaultMechanisms, MechanismFactory, SaslCallbacks, SaslClient};
pub use self::source::Source;

#[cfg(feature = "tokio")]
pub use self::engine::{Engine, EngineBuilder};
#[cfg(feature = "tokio")]
pub use self::transport::{LineSink, LineTransport, OutboundJob};
