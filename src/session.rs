//! The command loop: one frame in, one terminal frame out.
//!
//! Strictly sequential - a command, including all of its interleaved
//! output-notification frames, completes before the next frame is read.
//! Everything the session owns (reference table, scope registry, last
//! fault) is mutated only from this loop, so no locking exists anywhere.
//!
//! Recoverable errors become `error` frames and the loop resumes;
//! transport failures propagate out and abort the process. `stop` is the
//! only lifecycle control: after a short grace delay the transport is torn
//! down and the loop exits. A long-running guest execution stalls the
//! whole loop, `stop` included - an accepted limitation.

use std::time::Duration;

use anyhow::Result as Fatal;
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::exec::Executor;
use crate::marshal::{Format, Marshaler};
use crate::protocol::{Command, DecrefCommand, EchoCommand, ExecCommand, Frame};
use crate::redirect::{Channel, OutputSink, PassthroughSink};
use crate::report::Reporter;
use crate::transport::Transport;

/// Delay between accepting `stop` and tearing down the transport.
const STOP_GRACE: Duration = Duration::from_secs(1);

enum Step {
    Reply(Frame),
    Stop,
}

pub struct Session {
    transport: Transport,
    marshaler: Marshaler,
    executor: Executor,
    reporter: Reporter,
    grace: Duration,
}

impl Session {
    pub fn new(transport: Transport) -> Session {
        Session {
            transport,
            marshaler: Marshaler::new(),
            executor: Executor::new(),
            reporter: Reporter::new(),
            grace: STOP_GRACE,
        }
    }

    /// Override the stop grace delay (tests use a short one).
    pub fn set_grace(&mut self, grace: Duration) {
        self.grace = grace;
    }

    /// Run until `stop` or a transport failure.
    pub fn run(&mut self) -> Fatal<()> {
        loop {
            let frame = self.transport.recv()?;
            match self.dispatch(frame)? {
                Step::Reply(reply) => self.transport.send(&reply)?,
                Step::Stop => {
                    tracing::info!("stop received, shutting down");
                    std::thread::sleep(self.grace);
                    break;
                }
            }
        }
        self.transport.shutdown()
    }

    /// Handle one command. Recoverable errors are converted into `error`
    /// frames here; only transport failures bubble out.
    fn dispatch(&mut self, frame: Json) -> Fatal<Step> {
        let outcome = match Command::parse(&frame) {
            Ok(Command::Stop) => return Ok(Step::Stop),
            Ok(Command::Echo(echo)) => self.handle_echo(echo),
            Ok(Command::Exec(exec)) => return self.handle_exec(exec),
            Ok(Command::Decref(decref)) => self.handle_decref(decref),
            Err(e) => Err(e),
        };
        Ok(Step::Reply(self.settle(outcome)))
    }

    fn settle(&mut self, outcome: Result<Frame>) -> Frame {
        outcome.unwrap_or_else(|e| self.reporter.report(&e))
    }

    /// Echo decodes the payload and re-encodes it with `any` - a wire
    /// round trip through the value model.
    fn handle_echo(&mut self, echo: EchoCommand) -> Result<Frame> {
        let value = self.marshaler.decode(&echo.msg)?;
        let wire = self.marshaler.encode(&value, &Format::Any)?;
        Ok(Frame::Result { value: wire })
    }

    fn handle_exec(&mut self, exec: ExecCommand) -> Fatal<Step> {
        let format = match &exec.format {
            Some(f) => match Format::parse(f) {
                Ok(format) => format,
                Err(e) => return Ok(Step::Reply(self.reporter.report(&e))),
            },
            None => Format::Any,
        };
        let outcome = if self.transport.redirects_output() {
            let mut sink = FrameSink::new(&mut self.transport);
            let result = self.executor.execute(
                &exec.code,
                exec.scope.as_deref(),
                exec.locals,
                &format,
                &mut self.marshaler,
                &mut sink,
            );
            if let Some(failure) = sink.failure.take() {
                // The notification channel died mid-command: fatal.
                return Err(failure);
            }
            result
        } else {
            let mut sink = PassthroughSink;
            self.executor.execute(
                &exec.code,
                exec.scope.as_deref(),
                exec.locals,
                &format,
                &mut self.marshaler,
                &mut sink,
            )
        };
        match outcome {
            Ok(value) => Ok(Step::Reply(Frame::Result { value })),
            Err(e) => Ok(Step::Reply(self.reporter.report(&e))),
        }
    }

    fn handle_decref(&mut self, decref: DecrefCommand) -> Result<Frame> {
        if !self.transport.supports_decref() {
            return Err(Error::Protocol(
                "decref is not available on this binding".to_string(),
            ));
        }
        for handle in &decref.refs {
            self.marshaler.refs.release(handle)?;
        }
        Ok(Frame::Result { value: Json::Null })
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }
}

/// Sink that forwards each guest write immediately as a notification
/// frame on the socket transport. A failed write is remembered and
/// surfaces as a transport-fatal error once the command finishes.
struct FrameSink<'a> {
    transport: &'a mut Transport,
    failure: Option<anyhow::Error>,
}

impl<'a> FrameSink<'a> {
    fn new(transport: &'a mut Transport) -> FrameSink<'a> {
        FrameSink {
            transport,
            failure: None,
        }
    }
}

impl OutputSink for FrameSink<'_> {
    fn write(&mut self, channel: Channel, text: &str) {
        if self.failure.is_some() {
            return;
        }
        let frame = match channel {
            Channel::Stdout => Frame::Stdout {
                text: text.to_string(),
            },
            Channel::Stderr => Frame::Stderr {
                text: text.to_string(),
            },
        };
        if let Err(e) = self.transport.send(&frame) {
            self.failure = Some(e);
        }
    }
}
