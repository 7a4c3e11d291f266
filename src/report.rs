//! Fault reporting.
//!
//! Converts a command-level [`Error`] into the wire `error` frame: a short
//! summary message plus a trace of source-location lines in **reverse**
//! (innermost-first) order, so the most relevant frame reads first. The
//! most recent fault is retained in process-wide last-error state for
//! diagnostics.

use crate::error::{Error, TraceFrame};
use crate::protocol::Frame;

/// The retained most-recent fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastFault {
    pub msg: String,
    pub trace: Vec<String>,
}

#[derive(Default)]
pub struct Reporter {
    last: Option<LastFault>,
}

impl Reporter {
    pub fn new() -> Reporter {
        Reporter::default()
    }

    /// Build the error frame for `err` and retain it as the last fault.
    pub fn report(&mut self, err: &Error) -> Frame {
        let msg = err.to_string();
        let trace = match err {
            Error::Guest { frames, .. } => format_trace(frames),
            _ => Vec::new(),
        };
        tracing::debug!("command failed: {}", msg);
        self.last = Some(LastFault {
            msg: msg.clone(),
            trace: trace.clone(),
        });
        Frame::Error { msg, trace }
    }

    pub fn last(&self) -> Option<&LastFault> {
        self.last.as_ref()
    }
}

/// Frames arrive outermost-first from the interpreter; the wire trace is
/// innermost-first.
fn format_trace(frames: &[TraceFrame]) -> Vec<String> {
    frames
        .iter()
        .rev()
        .map(|f| format!("line {}, in {}", f.line, f.func))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn guest_trace_is_reversed_to_innermost_first() {
        let mut reporter = Reporter::new();
        let err = Error::Guest {
            msg: "division by zero".to_string(),
            frames: vec![
                TraceFrame::new("<input>", 3),
                TraceFrame::new("g", 2),
                TraceFrame::new("f", 1),
            ],
        };
        let frame = reporter.report(&err);
        match frame {
            Frame::Error { msg, trace } => {
                assert_eq!(msg, "division by zero");
                assert_eq!(
                    trace,
                    vec!["line 1, in f", "line 2, in g", "line 3, in <input>"]
                );
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn non_guest_errors_have_empty_traces_and_update_last() {
        let mut reporter = Reporter::new();
        assert!(reporter.last().is_none());
        reporter.report(&Error::UnknownReference("h01".to_string()));
        let last = reporter.last().unwrap();
        assert_eq!(last.msg, "unknown reference: h01");
        assert!(last.trace.is_empty());
    }
}
