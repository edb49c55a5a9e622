//! Outbound jobs and the line sink they render into.

use std::collections::VecDeque;
use std::fmt;

use crate::connection::{Connection, Local};
use crate::error::Result;
use crate::event::Priority;
use crate::wire::EmissionKey;

/// Scratch buffer a job writes exactly one line into.
///
/// Line-breaking bytes (`\r`, `\n`, `\0`) are replaced with spaces as they are
/// written, so no argument can forge a line boundary. The CTCP delimiter
/// `\x01` passes through.
#[derive(Debug, Default)]
pub struct LineSink {
    line: String,
}

impl LineSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text to the line.
    pub fn push_str(&mut self, text: &str) {
        self.line.extend(
            text.chars()
                .map(|c| if matches!(c, '\r' | '\n' | '\0') { ' ' } else { c }),
        );
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }

    /// The line written so far.
    pub fn as_str(&self) -> &str {
        &self.line
    }

    pub(crate) fn into_line(self) -> String {
        self.line
    }
}

impl fmt::Write for LineSink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

/// Renders one line at write time.
pub type RenderFn = Box<dyn FnOnce(&Connection, &mut LineSink) -> Result<()> + Send>;

/// A unit of work for the writer.
pub struct OutboundJob {
    /// Queue the job goes on.
    pub priority: Priority,
    /// Writes the line. Writing nothing skips the job.
    pub render: RenderFn,
    /// Echo correlation key, recorded once the line is written.
    pub emission_key: Option<EmissionKey>,
}

impl OutboundJob {
    /// Create a job from a render callback.
    pub fn new<F>(priority: Priority, render: F) -> Self
    where
        F: FnOnce(&Connection, &mut LineSink) -> Result<()> + Send + 'static,
    {
        Self {
            priority,
            render: Box::new(render),
            emission_key: None,
        }
    }

    /// Create a job that writes a fixed line.
    pub fn line(priority: Priority, text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(priority, move |_, sink| {
            sink.push_str(&text);
            Ok(())
        })
    }

    /// Attach an emission key.
    pub fn with_emission_key(mut self, key: Option<EmissionKey>) -> Self {
        self.emission_key = key;
        self
    }
}

impl fmt::Debug for OutboundJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundJob")
            .field("priority", &self.priority)
            .field("emission_key", &self.emission_key)
            .finish_non_exhaustive()
    }
}

/// Number of recent emissions remembered per connection.
pub const EMISSION_LOG_CAPACITY: usize = 64;

/// Recently written PRIVMSG/NOTICE keys, oldest first.
#[derive(Debug, Default)]
pub struct EmissionLog {
    keys: VecDeque<EmissionKey>,
}

impl Local for EmissionLog {}

impl EmissionLog {
    /// Remember a written line, evicting the oldest past capacity.
    pub fn record(&mut self, key: EmissionKey) {
        if self.keys.len() == EMISSION_LOG_CAPACITY {
            self.keys.pop_front();
        }
        self.keys.push_back(key);
    }

    /// Remove the oldest matching key. Returns whether one was found.
    pub fn consume(&mut self, key: &EmissionKey) -> bool {
        match self.keys.iter().position(|k| k == key) {
            Some(index) => {
                self.keys.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of remembered keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    #[test]
    fn test_sink_replaces_line_breaks() {
        let mut sink = LineSink::new();
        sink.push_str("PRIVMSG #c :hi\r\nQUIT");
        write!(sink, " {}\0", "x").unwrap();
        assert_eq!(sink.as_str(), "PRIVMSG #c :hi  QUIT x ");
    }

    #[test]
    fn test_sink_keeps_ctcp_delimiter() {
        let mut sink = LineSink::new();
        sink.push_str("\x01ACTION waves\x01");
        assert_eq!(sink.as_str(), "\x01ACTION waves\x01");
    }

    #[test]
    fn test_emission_log_bounded() {
        let mut log = EmissionLog::default();
        for i in 0..EMISSION_LOG_CAPACITY + 5 {
            log.record(EmissionKey::new("PRIVMSG", &i.to_string()));
        }
        assert_eq!(log.len(), EMISSION_LOG_CAPACITY);
        assert!(!log.consume(&EmissionKey::new("PRIVMSG", "0")));
        assert!(log.consume(&EmissionKey::new("PRIVMSG", "5")));
        assert!(!log.consume(&EmissionKey::new("PRIVMSG", "5")));
    }
}
