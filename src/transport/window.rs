//! Send window, priority queues and the writer's scheduling decision.
//!
//! Everything here runs under the transport's single mutex; the writer asks
//! [`WindowState::next_step`] what to do, performs I/O without the lock, and
//! reports back with [`WindowState::commit_line`].

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use super::job::OutboundJob;

/// Smallest usable window: one data line plus the keepalive probe.
pub const MIN_WINDOW_SIZE: u64 = 2;

/// What the writer should do next.
pub(crate) enum Step {
    /// Send `PING Q<n>` now.
    Probe(u64),
    /// Render and send a job.
    Send(OutboundJob),
    /// Shutdown requested: flush a queued job without sequencing it.
    Drain(OutboundJob),
    /// Sleep until woken or until the deadline.
    Wait(Instant),
    /// The window has been closed for longer than the stall timeout.
    Stalled,
    /// Shutdown requested and the queues are empty.
    Exit,
}

/// Public view of the sequence counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Number of the most recently sequenced line.
    pub seq: u64,
    /// Highest acknowledged line.
    pub ack: u64,
    /// Maximum outstanding lines.
    pub window_size: u64,
}

impl WindowSnapshot {
    /// Lines sent but not yet acknowledged.
    pub fn outstanding(&self) -> u64 {
        self.seq - self.ack
    }
}

pub(crate) struct WindowState {
    queues: [VecDeque<OutboundJob>; 3],
    seq: u64,
    ack: u64,
    window_size: u64,
    shutdown: bool,
    last_probe: Instant,
    pending_probe: Option<u64>,
    blocked_since: Option<Instant>,
}

impl WindowState {
    pub(crate) fn new(window_size: u64, now: Instant) -> Self {
        Self {
            queues: Default::default(),
            seq: 0,
            ack: 0,
            window_size: window_size.max(MIN_WINDOW_SIZE),
            shutdown: false,
            last_probe: now,
            pending_probe: None,
            blocked_since: None,
        }
    }

    pub(crate) fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            seq: self.seq,
            ack: self.ack,
            window_size: self.window_size,
        }
    }

    /// Queue a job. Returns `false` (dropping the job) once shut down.
    pub(crate) fn push(&mut self, job: OutboundJob) -> bool {
        if self.shutdown {
            return false;
        }
        self.queues[job.priority.index()].push_back(job);
        true
    }

    fn pop(&mut self) -> Option<OutboundJob> {
        self.queues.iter_mut().find_map(VecDeque::pop_front)
    }

    pub(crate) fn queued(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    pub(crate) fn outstanding(&self) -> u64 {
        self.seq - self.ack
    }

    /// Whether a data line may be sent, leaving the last slot for a probe.
    fn data_window_open(&self) -> bool {
        self.outstanding() + 1 < self.window_size
    }

    /// Raise `ack` towards `n`, never past `seq` and never down.
    /// Returns whether it advanced.
    pub(crate) fn acknowledge(&mut self, n: u64) -> bool {
        let target = n.min(self.seq);
        if target <= self.ack {
            return false;
        }
        self.ack = target;
        if self.pending_probe.is_some_and(|probe| probe <= self.ack) {
            self.pending_probe = None;
        }
        self.blocked_since = None;
        true
    }

    pub(crate) fn set_window_size(&mut self, n: u64) {
        self.window_size = n.max(MIN_WINDOW_SIZE);
    }

    pub(crate) fn begin_shutdown(&mut self) {
        self.shutdown = true;
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Treat everything sent so far as acknowledged.
    pub(crate) fn resume(&mut self) {
        self.ack = self.seq;
        self.pending_probe = None;
        self.blocked_since = None;
    }

    /// Assign the next sequence number to a line about to be written.
    pub(crate) fn commit_line(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn probe_due(&self, now: Instant, interval: Duration) -> bool {
        // Over a shrunk window a single probe still goes out so `ack` can
        // catch up; otherwise the last slot is the probe's.
        if self.outstanding() >= self.window_size {
            return self.pending_probe.is_none();
        }
        now.duration_since(self.last_probe) >= interval
            || (!self.data_window_open() && self.pending_probe.is_none())
    }

    pub(crate) fn next_step(
        &mut self,
        now: Instant,
        interval: Duration,
        stall_timeout: Duration,
    ) -> Step {
        if self.shutdown {
            return match self.pop() {
                Some(job) => Step::Drain(job),
                None => Step::Exit,
            };
        }

        if self.probe_due(now, interval) {
            let n = self.commit_line();
            self.last_probe = now;
            self.pending_probe = Some(n);
            return Step::Probe(n);
        }

        if !self.data_window_open() {
            let since = *self.blocked_since.get_or_insert(now);
            let stall_at = since + stall_timeout;
            if now >= stall_at {
                return Step::Stalled;
            }
            let deadline = if self.outstanding() < self.window_size {
                stall_at.min(self.last_probe + interval)
            } else {
                stall_at
            };
            return Step::Wait(deadline);
        }
        self.blocked_since = None;

        match self.pop() {
            Some(job) => Step::Send(job),
            None => Step::Wait(self.last_probe + interval),
        }
    }
}
