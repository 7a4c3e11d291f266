//! Error taxonomy for the command loop.
//!
//! Everything here is recoverable: each variant is caught at the
//! single-command boundary in `session`, converted into an `error` frame,
//! and the loop resumes. Transport-level failures are deliberately *not*
//! part of this enum - they travel as `anyhow::Error` and abort the
//! process.

use thiserror::Error;

/// One source-location frame of a guest fault.
///
/// Frames are recorded outermost-first while the interpreter runs; the
/// reporter reverses them so the innermost frame leads the wire trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    /// Function name, or `<input>` for top-level statements.
    pub func: String,
    /// 1-based source line within the submitted code.
    pub line: u32,
}

impl TraceFrame {
    pub fn new(func: impl Into<String>, line: u32) -> Self {
        Self {
            func: func.into(),
            line,
        }
    }
}

/// Recoverable command-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown or malformed command tag / fields.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Value/format mismatch in encode or decode.
    #[error("marshal error: {0}")]
    Marshal(String),

    /// A handle that is not (or no longer) in the reference table.
    #[error("unknown reference: {0}")]
    UnknownReference(String),

    /// Refcount bookkeeping would go below zero. Defensive; unreachable
    /// as long as entries are removed exactly at zero.
    #[error("negative refcount for {0}")]
    NegativeRefcount(String),

    /// A fault raised by caller-supplied guest code.
    #[error("{msg}")]
    Guest {
        msg: String,
        frames: Vec<TraceFrame>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a marshal error with a formatted message.
    pub fn marshal(msg: impl Into<String>) -> Self {
        Error::Marshal(msg.into())
    }
}
