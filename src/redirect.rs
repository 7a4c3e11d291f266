//! Output capture for guest code.
//!
//! The interpreter writes its two logical output channels through an
//! [`OutputSink`]. Sinks are write-only - there is nothing to read or seek
//! - and text-typed, so non-text payloads are unrepresentable by
//! construction. The socket binding installs a sink that forwards every
//! write immediately as a `stdout`/`stderr` notification frame (see
//! `session`); the stdio binding does not redirect and falls through to
//! the process's own standard streams.

use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Stdout => "stdout",
            Channel::Stderr => "stderr",
        }
    }
}

/// Destination for guest output. Implementations must forward each write
/// immediately; batching would reorder output against result frames.
pub trait OutputSink {
    fn write(&mut self, channel: Channel, text: &str);
}

/// Sink for the stdio binding: guest output goes to the process's own
/// standard streams, unredirected.
#[derive(Default)]
pub struct PassthroughSink;

impl OutputSink for PassthroughSink {
    fn write(&mut self, channel: Channel, text: &str) {
        // Best effort; a broken host stream is not a guest fault.
        let result = match channel {
            Channel::Stdout => std::io::stdout().write_all(text.as_bytes()),
            Channel::Stderr => std::io::stderr().write_all(text.as_bytes()),
        };
        if let Err(e) = result {
            tracing::warn!("guest output dropped: {}", e);
        }
    }
}

/// Test sink that records writes in order.
#[derive(Default)]
pub struct CaptureSink {
    events: Vec<(Channel, String)>,
}

impl CaptureSink {
    pub fn events(&self) -> &[(Channel, String)] {
        &self.events
    }

    /// Concatenated stdout-channel text.
    pub fn stdout(&self) -> String {
        self.events
            .iter()
            .filter(|(c, _)| *c == Channel::Stdout)
            .map(|(_, t)| t.as_str())
            .collect()
    }
}

impl OutputSink for CaptureSink {
    fn write(&mut self, channel: Channel, text: &str) {
        self.events.push((channel, text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn capture_preserves_channel_and_order() {
        let mut sink = CaptureSink::default();
        sink.write(Channel::Stdout, "a\n");
        sink.write(Channel::Stderr, "warn\n");
        sink.write(Channel::Stdout, "b\n");
        assert_eq!(
            sink.events(),
            &[
                (Channel::Stdout, "a\n".to_string()),
                (Channel::Stderr, "warn\n".to_string()),
                (Channel::Stdout, "b\n".to_string()),
            ]
        );
        assert_eq!(sink.stdout(), "a\nb\n");
        assert_eq!(Channel::Stderr.name(), "stderr");
    }
}
