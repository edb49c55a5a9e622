//! Writer loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};

use super::job::{EmissionLog, LineSink, OutboundJob};
use super::window::Step;
use super::Shared;
use crate::config::StallPolicy;
use crate::connection::Connection;
use crate::error::Result;
use crate::event::Termination;

/// Render a job into wire bytes. `None` when the job wrote nothing.
fn encode_job(job: OutboundJob, connection: &Connection) -> Result<Option<Vec<u8>>> {
    let mut sink = LineSink::new();
    (job.render)(connection, &mut sink)?;
    if sink.is_empty() {
        return Ok(None);
    }
    let line = sink.into_line();
    trace!(priority = ?job.priority, line = %line, "send");
    let mut bytes = connection.encode(&line).into_owned();
    bytes.extend_from_slice(b"\r\n");
    Ok(Some(bytes))
}

async fn write_line<W: AsyncWrite + Unpin>(stream: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Write one line, giving up once `limit` passes with the peer not reading.
async fn write_bounded<W: AsyncWrite + Unpin>(
    stream: &mut W,
    bytes: &[u8],
    limit: Duration,
) -> std::io::Result<()> {
    match tokio::time::timeout(limit, write_line(stream, bytes)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("peer did not read for {limit:?}"),
        )),
    }
}

#[instrument(name = "writer", skip_all, fields(remote = ?connection.remote_addr()))]
pub(crate) async fn write_loop<W>(
    mut stream: W,
    shared: Arc<Shared>,
    connection: Arc<Connection>,
) where
    W: AsyncWrite + Unpin,
{
    let config = &shared.config;
    let cancel = shared.cancel.clone();

    let reason = loop {
        if cancel.is_cancelled() {
            debug!("writer cancelled");
            break None;
        }

        let step = shared.state.lock().next_step(
            Instant::now(),
            config.keepalive_interval,
            config.stall_timeout,
        );

        let sequenced = matches!(step, Step::Send(_));
        // Flushing after terminate must not outlive an unresponsive peer.
        let limit = if matches!(step, Step::Drain(_)) {
            config.keepalive_interval
        } else {
            config.stall_timeout
        };
        let (bytes, key) = match step {
            Step::Exit => break Some(Termination::Requested),
            Step::Wait(deadline) => {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = shared.wakeup.notified() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
                continue;
            }
            Step::Stalled => match config.stall_policy {
                StallPolicy::Disconnect => {
                    warn!(
                        timeout = ?config.stall_timeout,
                        "peer stopped acknowledging, disconnecting"
                    );
                    break Some(Termination::Stalled);
                }
                StallPolicy::Resume => {
                    warn!(timeout = ?config.stall_timeout, "peer stopped acknowledging, resuming");
                    shared.state.lock().resume();
                    continue;
                }
            },
            Step::Probe(n) => {
                let line = format!("PING Q{n}");
                trace!(probe = n, "keepalive probe");
                let mut bytes = connection.encode(&line).into_owned();
                bytes.extend_from_slice(b"\r\n");
                (bytes, None)
            }
            Step::Send(job) | Step::Drain(job) => {
                let key = job.emission_key.clone();
                match encode_job(job, &connection) {
                    Ok(Some(bytes)) => (bytes, key),
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(error = %e, "outbound job failed");
                        break Some(Termination::WriteFailed(e.to_string()));
                    }
                }
            }
        };

        if sequenced {
            shared.state.lock().commit_line();
        }
        // Recorded before writing so a fast echo still finds it.
        if let Some(key) = key {
            connection
                .locals()
                .get_or_insert_with(EmissionLog::default, |log| log.record(key));
        }

        if let Err(e) = write_bounded(&mut stream, &bytes, limit).await {
            warn!(error = %e, "write failed");
            break Some(Termination::WriteFailed(e.to_string()));
        }
    };

    match tokio::time::timeout(config.keepalive_interval, stream.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "socket shutdown failed"),
        Err(_) => debug!("socket shutdown timed out"),
    }
    debug!(?reason, "writer finished");
    if let Some(reason) = reason {
        shared.finish(reason);
    }
}
