//! The assembled client engine.
//!
//! [`EngineBuilder`] wires a [`Connection`], a [`Pipeline`] with the built-in
//! handlers, and a [`LineTransport`], then starts the transport on a stream.
//! Inbound lines are parsed and dispatched on the reader task; outbound
//! commands travel the pipeline to the [`TransportSink`] and are written by
//! the writer task.
//!
//! # Example
//!
//! ```no_run
//! use slirc_engine::{EngineBuilder, EngineConfig, Outbound};
//!
//! # async fn run() -> slirc_engine::Result<()> {
//! let config = EngineConfig {
//!     nickname: "slirc-bot".into(),
//!     ..EngineConfig::default()
//! };
//! let engine = EngineBuilder::new(config).connect("irc.libera.chat:6667").await?;
//! engine.send(Outbound::Join {
//!     channels: vec!["#slirc".into()],
//!     keys: vec![],
//! });
//! engine.closed().await;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::connection::{Connection, Local};
use crate::error::{EngineError, Result};
use crate::event::{Event, Inbound, Outbound, Priority, Termination};
use crate::handlers::{EchoFilter, KeepaliveAck, PingResponder, Registration, TransportSink};
use crate::negotiation::{CapNegotiator, NickServIdentify, SaslAuthenticator};
use crate::parser;
use crate::pipeline::{Handler, Pipeline, Position};
use crate::sasl::{DefaultMechanisms, MechanismFactory};
use crate::transport::{self, LineSink, LineTransport, OutboundJob};
use crate::wire;

type DisconnectFn = Box<dyn FnOnce(&Arc<Connection>, &Termination) + Send>;

/// Collects configuration and extra handlers, then starts an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    handlers: Vec<(Arc<dyn Handler>, Position)>,
    mechanisms: Arc<dyn MechanismFactory>,
    on_disconnect: Option<DisconnectFn>,
}

impl EngineBuilder {
    /// Start building an engine for `config`.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            handlers: Vec::new(),
            mechanisms: Arc::new(DefaultMechanisms),
            on_disconnect: None,
        }
    }

    /// Add a handler after the built-ins, at `position`.
    pub fn handler(mut self, handler: impl Handler + 'static, position: Position) -> Self {
        self.handlers.push((Arc::new(handler), position));
        self
    }

    /// Use `factory` to build SASL mechanisms.
    pub fn mechanisms(mut self, factory: impl MechanismFactory + 'static) -> Self {
        self.mechanisms = Arc::new(factory);
        self
    }

    /// Run `f` once the connection has ended.
    pub fn on_disconnect<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Arc<Connection>, &Termination) + Send + 'static,
    {
        self.on_disconnect = Some(Box::new(f));
        self
    }

    /// Connect over plain TCP and start.
    pub async fn connect(self, addr: impl ToSocketAddrs) -> Result<Engine> {
        let stream = TcpStream::connect(addr).await?;
        let remote = transport::peer_addr(&stream)?;
        transport::enable_keepalive(&stream);
        info!(%remote, "connected");
        self.start_with(stream, Some(remote))
    }

    /// Connect over TLS and start.
    pub async fn connect_tls(
        self,
        addr: impl ToSocketAddrs,
        server_name: &str,
        tls: Arc<ClientConfig>,
    ) -> Result<Engine> {
        let name = ServerName::try_from(server_name.to_owned())
            .map_err(|e| EngineError::Config(format!("invalid server name: {}", e)))?;
        let stream = TcpStream::connect(addr).await?;
        let remote = transport::peer_addr(&stream)?;
        transport::enable_keepalive(&stream);

        let stream = TlsConnector::from(tls).connect(name, stream).await?;
        info!(%remote, server_name, "connected with TLS");
        self.start_with(stream, Some(remote))
    }

    /// Start on an already-connected stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S>(self, stream: S) -> Result<Engine>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.start_with(stream, None)
    }

    fn start_with<S>(self, stream: S, remote: Option<SocketAddr>) -> Result<Engine>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let Self {
            config,
            handlers,
            mechanisms,
            on_disconnect,
        } = self;
        config.validate()?;

        let connection = Arc::new(Connection::new(
            remote,
            config.resolve_encoding()?,
            config.nickname.clone(),
        ));
        let pipeline = Arc::new(Pipeline::new(connection.clone()));
        let transport = Arc::new(LineTransport::new(config.transport.clone()));

        for handler in builtin_handlers(&config, &transport, mechanisms) {
            pipeline.register(handler, Position::Last)?;
        }
        for (handler, position) in handlers {
            pipeline.register(handler, position)?;
        }
        debug!(handlers = ?pipeline.handler_names(), "pipeline assembled");

        let on_line = {
            let pipeline = Arc::downgrade(&pipeline);
            let connection = connection.clone();
            move |line: &[u8]| {
                let Some(pipeline) = pipeline.upgrade() else {
                    return;
                };
                if let Some(event) = parser::parse(&connection, line) {
                    pipeline.dispatch_inbound(event);
                }
            }
        };
        let on_terminate = {
            let pipeline: Weak<Pipeline> = Arc::downgrade(&pipeline);
            let connection = connection.clone();
            move |reason: Termination| {
                if let Some(pipeline) = pipeline.upgrade() {
                    pipeline.dispatch_inbound(Inbound::Disconnected(reason.clone()));
                }
                if let Some(f) = on_disconnect {
                    f(&connection, &reason);
                }
            }
        };

        transport.start(stream, connection.clone(), on_line, on_terminate)?;
        pipeline.dispatch_inbound(Inbound::Connected);

        Ok(Engine {
            connection,
            pipeline,
            transport,
        })
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

/// Built-in handlers in pipeline order, wire end first.
fn builtin_handlers(
    config: &EngineConfig,
    transport: &Arc<LineTransport>,
    mechanisms: Arc<dyn MechanismFactory>,
) -> Vec<Arc<dyn Handler>> {
    let mut handlers: Vec<Arc<dyn Handler>> = vec![
        Arc::new(TransportSink::new(transport.clone())),
        Arc::new(KeepaliveAck::new(transport.clone())),
        Arc::new(PingResponder),
        Arc::new(EchoFilter),
        Arc::new(CapNegotiator::new(
            config.desired_capabilities(),
            config.cap_version,
        )),
    ];

    if let Some(sasl) = &config.sasl {
        handlers.push(Arc::new(SaslAuthenticator::new(
            mechanisms,
            Arc::new(sasl.clone()),
        )));
        if let (true, Some(password)) = (config.nickserv, &sasl.password) {
            handlers.push(Arc::new(NickServIdentify::new(
                sasl.account.clone(),
                password.clone(),
            )));
        }
    }

    handlers.push(Arc::new(Registration::new(
        config.nickname.clone(),
        config.username.clone(),
        config.realname.clone(),
        config.password.clone(),
    )));
    handlers
}

/// A running client connection.
///
/// Dropping the engine stops the transport tasks without flushing; call
/// [`terminate`](Self::terminate) or [`quit`](Self::quit) for an orderly
/// close.
pub struct Engine {
    connection: Arc<Connection>,
    pipeline: Arc<Pipeline>,
    transport: Arc<LineTransport>,
}

impl Engine {
    /// Queue a line rendered by `render` at write time, bypassing the
    /// pipeline.
    pub fn submit_outbound<F>(&self, priority: Priority, render: F)
    where
        F: FnOnce(&Connection, &mut LineSink) -> Result<()> + Send + 'static,
    {
        self.transport.enqueue(OutboundJob::new(priority, render));
    }

    /// Send a command through the pipeline at its default priority.
    pub fn send(&self, message: Outbound) {
        self.pipeline.dispatch(Event::transmit(message));
    }

    /// Insert a handler into the running pipeline.
    pub fn register_handler(&self, handler: Arc<dyn Handler>, position: Position) -> Result<()> {
        self.pipeline.register(handler, position)
    }

    /// Inject an inbound event.
    pub fn dispatch_inbound(&self, event: Inbound) {
        self.pipeline.dispatch_inbound(event);
    }

    /// Inject an outbound command at `priority`.
    pub fn dispatch_outbound(&self, message: Outbound, priority: Priority) {
        self.pipeline.dispatch_outbound(message, priority);
    }

    /// Change the flow-control window.
    pub fn set_window_size(&self, n: u64) {
        self.transport.set_window_size(n);
    }

    /// Send `QUIT` after everything already queued, then close.
    ///
    /// The line goes straight to the transport: a dispatch still running on
    /// another thread would otherwise render it after shutdown.
    pub fn quit(&self, reason: Option<String>) {
        match wire::render(&Outbound::Quit(reason)) {
            Ok(lines) => {
                for line in lines {
                    self.transport
                        .enqueue(OutboundJob::line(Priority::Low, line.text));
                }
            }
            Err(e) => warn!(error = %e, "cannot render QUIT"),
        }
        self.transport.terminate();
    }

    /// Flush queued lines and close. Idempotent.
    pub fn terminate(&self) {
        self.transport.terminate();
    }

    /// Resolves once the connection has ended.
    pub async fn closed(&self) {
        self.transport.closed().await
    }

    /// The connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// The pipeline.
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// The transport.
    pub fn transport(&self) -> &Arc<LineTransport> {
        &self.transport
    }

    /// Read a connection-local value.
    pub fn local<T: Local, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.connection.locals().with(f)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("connection", &self.connection)
            .field("pipeline", &self.pipeline)
            .field("transport", &self.transport)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SaslCredentials;

    #[test]
    fn test_builtin_order() {
        let config = EngineConfig {
            sasl: Some(SaslCredentials {
                account: "bot".into(),
                password: Some("pw".into()),
                ..SaslCredentials::default()
            }),
            ..EngineConfig::default()
        };
        let transport = Arc::new(LineTransport::new(config.transport.clone()));
        let names: Vec<String> = builtin_handlers(&config, &transport, Arc::new(DefaultMechanisms))
            .iter()
            .map(|h| h.name().to_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                TransportSink::NAME,
                KeepaliveAck::NAME,
                PingResponder::NAME,
                EchoFilter::NAME,
                CapNegotiator::NAME,
                SaslAuthenticator::NAME,
                NickServIdentify::NAME,
                Registration::NAME,
            ]
        );
    }

    #[test]
    fn test_no_sasl_handlers_without_credentials() {
        let config = EngineConfig::default();
        let transport = Arc::new(LineTransport::new(config.transport.clone()));
        let names: Vec<String> = builtin_handlers(&config, &transport, Arc::new(DefaultMechanisms))
            .iter()
            .map(|h| h.name().to_owned())
            .collect();
        assert!(!names.iter().any(|n| n == SaslAuthenticator::NAME));
        assert!(!names.iter().any(|n| n == NickServIdentify::NAME));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let (client, _server) = tokio::io::duplex(64);
        let config = EngineConfig {
            nickname: String::new(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            EngineBuilder::new(config).start(client),
            Err(EngineError::Config(_))
        ));
    }
}
