//! Windowed line transport.
//!
//! [`LineTransport`] runs one reader task and one writer task over any
//! `AsyncRead + AsyncWrite` stream:
//!
//! - the reader frames lines (LF, optional CR) and hands each to a callback
//!   as a borrowed byte slice;
//! - the writer drains three priority queues, assigns each written line a
//!   sequence number and pauses when the number of unacknowledged lines
//!   reaches the window size;
//! - a `PING Q<n>` keepalive probe is sent every keepalive interval and
//!   whenever the data window fills; the peer's `PONG Q<n>` is fed back
//!   through [`LineTransport::acknowledge`].
//!
//! Queues, counters and the shutdown flag live under one mutex. The
//! termination callback runs exactly once, whichever side ends first.

mod job;
mod reader;
mod window;
mod writer;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::connection::Connection;
use crate::error::{EngineError, Result};
use crate::event::Termination;

pub use self::job::{EmissionLog, LineSink, OutboundJob, RenderFn, EMISSION_LOG_CAPACITY};
pub use self::window::{WindowSnapshot, MIN_WINDOW_SIZE};

type TerminateFn = Box<dyn FnOnce(Termination) + Send>;

pub(crate) struct Shared {
    config: TransportConfig,
    state: Mutex<window::WindowState>,
    wakeup: Notify,
    cancel: CancellationToken,
    terminated: AtomicBool,
    on_terminate: Mutex<Option<TerminateFn>>,
}

impl Shared {
    /// Stop both loops and run the termination callback, once.
    fn finish(&self, reason: Termination) {
        self.state.lock().begin_shutdown();
        self.cancel.cancel();
        self.wakeup.notify_one();

        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(?reason, "connection terminated");
        let callback = self.on_terminate.lock().take();
        if let Some(callback) = callback {
            callback(reason);
        }
    }
}

/// Flow-controlled, line-oriented duplex connection.
pub struct LineTransport {
    shared: Arc<Shared>,
    started: AtomicBool,
}

impl LineTransport {
    /// Create an idle transport.
    pub fn new(config: TransportConfig) -> Self {
        let window = config.window_size;
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(window::WindowState::new(window, Instant::now())),
                wakeup: Notify::new(),
                cancel: CancellationToken::new(),
                terminated: AtomicBool::new(false),
                on_terminate: Mutex::new(None),
            }),
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the reader and writer tasks and return immediately.
    ///
    /// `on_line` receives every inbound line without its terminator.
    /// `on_terminate` runs once when the connection ends for any reason.
    /// Must be called from within a tokio runtime.
    pub fn start<S, L, T>(
        &self,
        stream: S,
        connection: Arc<Connection>,
        on_line: L,
        on_terminate: T,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        L: Fn(&[u8]) + Send + 'static,
        T: FnOnce(Termination) + Send + 'static,
    {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(EngineError::AlreadyStarted);
        }
        *self.shared.on_terminate.lock() = Some(Box::new(on_terminate));

        let (read_half, write_half) = tokio::io::split(stream);
        debug!(remote = ?connection.remote_addr(), "starting transport");
        tokio::spawn(reader::read_loop(
            read_half,
            self.shared.clone(),
            connection.clone(),
            on_line,
        ));
        tokio::spawn(writer::write_loop(write_half, self.shared.clone(), connection));
        Ok(())
    }

    /// Queue a job for the writer. Silently dropped once shutting down.
    pub fn enqueue(&self, job: OutboundJob) {
        let accepted = self.shared.state.lock().push(job);
        if accepted {
            self.shared.wakeup.notify_one();
        } else {
            debug!("transport shutting down, dropping outbound job");
        }
    }

    /// Raise the acknowledged sequence number. Never lowers it.
    pub fn acknowledge(&self, n: u64) {
        let advanced = self.shared.state.lock().acknowledge(n);
        if advanced {
            self.shared.wakeup.notify_one();
        }
    }

    /// Change the window size (minimum [`MIN_WINDOW_SIZE`]).
    pub fn set_window_size(&self, n: u64) {
        self.shared.state.lock().set_window_size(n);
        self.shared.wakeup.notify_one();
    }

    /// Request shutdown. Already-queued jobs are flushed, then the socket is
    /// closed. Idempotent.
    pub fn terminate(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.is_shutdown() {
                return;
            }
            state.begin_shutdown();
        }
        debug!("terminate requested");
        self.shared.wakeup.notify_one();

        if !self.started.load(Ordering::Acquire) {
            self.shared.finish(Termination::Requested);
        }
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shared.state.lock().is_shutdown()
    }

    /// Whether the termination callback has fired.
    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::Acquire)
    }

    /// Current sequence counters.
    pub fn window(&self) -> WindowSnapshot {
        self.shared.state.lock().snapshot()
    }

    /// Jobs waiting in the queues.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queued()
    }

    /// Lines sent and not yet acknowledged.
    pub fn outstanding(&self) -> u64 {
        self.shared.state.lock().outstanding()
    }

    /// Resolves once the connection has ended.
    pub async fn closed(&self) {
        self.shared.cancel.cancelled().await
    }
}

impl Drop for LineTransport {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

impl std::fmt::Debug for LineTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineTransport")
            .field("window", &self.window())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Remote address of a connected TCP stream.
pub fn peer_addr(stream: &TcpStream) -> Result<SocketAddr> {
    stream.peer_addr().map_err(|_| EngineError::NotConnected)
}

/// Enable TCP keepalive on an outgoing socket. Failure is logged, not fatal.
pub fn enable_keepalive(stream: &TcpStream) {
    use socket2::{SockRef, TcpKeepalive};

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));

    if let Err(e) = sock.set_tcp_keepalive(&keepalive) {
        warn!("failed to enable TCP keepalive: {}", e);
    }
}
