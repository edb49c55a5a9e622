//! Reader loop and line framing.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument, trace, warn};

use super::Shared;
use crate::connection::Connection;
use crate::event::Termination;

/// Splits a byte stream into lines terminated by LF with an optional CR.
///
/// Lines are handed out as views into the buffer; consumed bytes are
/// compacted away after each pass.
pub(crate) struct LineBuffer {
    buffer: BytesMut,
    max_line_len: usize,
    discarding: bool,
}

impl LineBuffer {
    pub(crate) fn new(capacity: usize, max_line_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            max_line_len,
            discarding: false,
        }
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Deliver every complete line currently buffered.
    pub(crate) fn drain_lines(&mut self, mut on_line: impl FnMut(&[u8])) {
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let end = if newline_pos > 0 && self.buffer[newline_pos - 1] == b'\r' {
                newline_pos - 1
            } else {
                newline_pos
            };

            if self.discarding {
                self.discarding = false;
            } else if end > self.max_line_len {
                warn!(len = end, limit = self.max_line_len, "dropping oversized line");
            } else {
                on_line(&self.buffer[..end]);
            }
            self.buffer.advance(newline_pos + 1);
        }

        if self.buffer.len() > self.max_line_len {
            if !self.discarding {
                warn!(limit = self.max_line_len, "line exceeds limit, discarding until newline");
            }
            self.discarding = true;
            self.buffer.clear();
        }
    }

    /// Deliver a trailing unterminated line, once, at end of stream.
    pub(crate) fn finish(&mut self, mut on_line: impl FnMut(&[u8])) {
        let discarding = std::mem::replace(&mut self.discarding, false);
        if !discarding && !self.buffer.is_empty() {
            let mut end = self.buffer.len();
            if self.buffer[end - 1] == b'\r' {
                end -= 1;
            }
            if end > 0 {
                on_line(&self.buffer[..end]);
            }
        }
        self.buffer.clear();
    }
}

#[instrument(name = "reader", skip_all, fields(remote = ?connection.remote_addr()))]
pub(crate) async fn read_loop<R, F>(
    mut stream: R,
    shared: Arc<Shared>,
    connection: Arc<Connection>,
    on_line: F,
) where
    R: AsyncRead + Unpin,
    F: Fn(&[u8]),
{
    let chunk = shared.config.read_buffer_size.max(512);
    let mut lines = LineBuffer::new(chunk, shared.config.max_line_len);
    let cancel = shared.cancel.clone();

    let reason = loop {
        let buffer = lines.buffer_mut();
        if buffer.capacity() - buffer.len() < chunk / 2 {
            buffer.reserve(chunk);
        }

        let read = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reader cancelled");
                return;
            }
            read = stream.read_buf(buffer) => read,
        };

        match read {
            Ok(0) => {
                lines.finish(|line| {
                    trace!(len = line.len(), "final unterminated line");
                    on_line(line)
                });
                break Termination::Eof;
            }
            Ok(n) => {
                trace!(bytes = n, "read");
                lines.drain_lines(&on_line);
            }
            Err(e) => {
                warn!(error = %e, "read failed");
                break Termination::ReadFailed(e.to_string());
            }
        }
    };

    debug!(?reason, "reader finished");
    shared.finish(reason);
}
