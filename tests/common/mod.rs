//! A scripted IRC server on the far side of an in-memory duplex stream.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

use slirc_engine::{Context, Event, Flow, FnHandler, Inbound};

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Peer {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Peer {
    pub fn new(stream: DuplexStream) -> Self {
        let (read, writer) = tokio::io::split(stream);
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    /// Next line exactly as written, keepalive probes included.
    pub async fn next_raw(&mut self) -> String {
        timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .expect("read failed")
            .expect("client closed the stream")
    }

    /// Next line, answering any `PING Q<n>` probes on the way.
    pub async fn expect(&mut self) -> String {
        loop {
            let line = self.next_raw().await;
            match line.strip_prefix("PING ") {
                Some(payload) if payload.trim_start_matches(':').starts_with('Q') => {
                    let payload = payload.trim_start_matches(':').to_owned();
                    self.send(&format!(":irc.test PONG irc.test :{}", payload)).await;
                }
                _ => return line,
            }
        }
    }

    /// Assert the next non-probe line.
    pub async fn expect_line(&mut self, expected: &str) {
        assert_eq!(self.expect().await, expected);
    }

    /// Assert nothing but probes arrives for `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(line) = timeout(window, self.expect()).await {
            panic!("unexpected line: {:?}", line);
        }
    }

    /// Whether the client closed its side without writing anything more.
    pub async fn lines_closed(&mut self) -> bool {
        matches!(
            timeout(WAIT, self.lines.next_line()).await,
            Ok(Ok(None))
        )
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .expect("write failed");
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write failed");
    }

    /// Consume the `CAP LS`, `NICK` and `USER` every engine opens with.
    pub async fn expect_registration(&mut self, nick: &str) {
        self.expect_line("CAP LS 302").await;
        self.expect_line(&format!("NICK {}", nick)).await;
        assert!(self.expect().await.starts_with("USER "));
    }
}

/// A handler forwarding every inbound event to a channel.
pub fn inbound_tap() -> (
    FnHandler<impl Fn(&Context<'_>, &mut Event) -> slirc_engine::Result<Flow> + Send + Sync>,
    mpsc::UnboundedReceiver<Inbound>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = FnHandler::new("tap", move |_: &Context<'_>, event: &mut Event| {
        if let Event::Received(inbound) = event {
            let _ = tx.send(inbound.clone());
        }
        Ok(Flow::Continue)
    });
    (handler, rx)
}

/// Wait for the first event matching `pred`.
pub async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<Inbound>,
    pred: impl Fn(&Inbound) -> bool,
) -> Inbound {
    timeout(WAIT, async {
        loop {
            let event = rx.recv().await.expect("engine dropped the tap");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
