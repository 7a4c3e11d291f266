//! Transport: the abstract duplex channel the command loop runs over.
//!
//! Two bindings:
//!
//! - **stdio** - one JSON object per line over stdin/stdout. No output
//!   redirection, no `decref`.
//! - **socket** - Content-Length framed JSON over a Unix domain socket
//!   (see [`framing`]); the kernel connects to the peer address given in
//!   the `REPLINK_SOCKET` environment variable. Supports `decref` and the
//!   asynchronous `stdout`/`stderr` notification frames.
//!
//! Reads block until a full frame is available; writes are flushed
//! immediately. Every error returned here is transport-fatal: the caller
//! aborts the process rather than retrying.

pub mod framing;

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::Value as Json;

use crate::protocol::Frame;

/// Environment variable naming the socket peer address.
pub const SOCKET_ENV: &str = "REPLINK_SOCKET";

pub enum Transport {
    Stdio(StdioTransport),
    Socket(SocketTransport),
}

pub struct StdioTransport {
    reader: Box<dyn BufRead + Send>,
    writer: Box<dyn Write + Send>,
}

pub struct SocketTransport {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl Transport {
    /// Binding (a): newline-delimited frames over the standard streams.
    pub fn stdio() -> Transport {
        Transport::Stdio(StdioTransport {
            reader: Box::new(BufReader::new(io::stdin())),
            writer: Box::new(io::stdout()),
        })
    }

    /// Stdio binding over arbitrary streams (used by tests).
    pub fn stdio_from(
        reader: Box<dyn BufRead + Send>,
        writer: Box<dyn Write + Send>,
    ) -> Transport {
        Transport::Stdio(StdioTransport { reader, writer })
    }

    /// Binding (b): connect to the peer socket.
    pub fn connect(path: &Path) -> Result<Transport> {
        let stream = UnixStream::connect(path)
            .with_context(|| format!("Failed to connect to {}", path.display()))?;
        Transport::from_stream(stream)
    }

    /// Socket binding over an already-connected stream.
    pub fn from_stream(stream: UnixStream) -> Result<Transport> {
        let writer = stream.try_clone().context("Failed to clone socket")?;
        Ok(Transport::Socket(SocketTransport {
            reader: BufReader::new(stream),
            writer,
        }))
    }

    /// Block until one complete frame is available and parse it. Parse
    /// failures are fatal - the protocol makes no attempt to resynchronize
    /// a garbled stream.
    pub fn recv(&mut self) -> Result<Json> {
        let body = match self {
            Transport::Stdio(t) => {
                let mut line = String::new();
                let n = t
                    .reader
                    .read_line(&mut line)
                    .context("Failed to read frame line")?;
                let line = line.trim();
                if n == 0 || line.is_empty() {
                    return Err(anyhow!("unexpected end of input"));
                }
                line.to_string()
            }
            Transport::Socket(t) => framing::read_message(&mut t.reader)?,
        };
        serde_json::from_str(&body).with_context(|| format!("Malformed frame: {}", body))
    }

    /// Write one frame and flush it.
    pub fn send(&mut self, frame: &Frame) -> Result<()> {
        let body = serde_json::to_string(frame).context("Failed to serialize frame")?;
        match self {
            Transport::Stdio(t) => {
                t.writer
                    .write_all(body.as_bytes())
                    .context("Failed to write frame")?;
                t.writer.write_all(b"\n").context("Failed to write frame")?;
                t.writer.flush().context("Failed to flush frame")?;
            }
            Transport::Socket(t) => framing::write_message(&mut t.writer, &body)?,
        }
        Ok(())
    }

    /// Whether guest output is redirected into notification frames.
    pub fn redirects_output(&self) -> bool {
        matches!(self, Transport::Socket(_))
    }

    /// Whether the `decref` command is part of this binding.
    pub fn supports_decref(&self) -> bool {
        matches!(self, Transport::Socket(_))
    }

    pub fn shutdown(&mut self) -> Result<()> {
        match self {
            Transport::Stdio(t) => t.writer.flush().context("Failed to flush stdout"),
            Transport::Socket(t) => t
                .writer
                .shutdown(std::net::Shutdown::Both)
                .context("Failed to shut down socket"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stdio_pair(input: &str) -> (Transport, std::sync::Arc<std::sync::Mutex<Vec<u8>>>) {
        // Shared output buffer so the test can inspect what was written.
        #[derive(Clone)]
        struct Shared(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let out = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let transport = Transport::stdio_from(
            Box::new(BufReader::new(io::Cursor::new(input.as_bytes().to_vec()))),
            Box::new(Shared(out.clone())),
        );
        (transport, out)
    }

    #[test]
    fn stdio_reads_one_json_object_per_line() {
        let (mut t, _) = stdio_pair("{\"tag\":\"stop\"}\n{\"tag\":\"echo\"}\n");
        assert_eq!(t.recv().unwrap(), json!({"tag": "stop"}));
        assert_eq!(t.recv().unwrap(), json!({"tag": "echo"}));
    }

    #[test]
    fn stdio_eof_and_blank_line_are_fatal() {
        let (mut t, _) = stdio_pair("");
        assert!(t.recv().unwrap_err().to_string().contains("end of input"));
        let (mut t, _) = stdio_pair("\n");
        assert!(t.recv().unwrap_err().to_string().contains("end of input"));
    }

    #[test]
    fn stdio_malformed_json_is_fatal() {
        let (mut t, _) = stdio_pair("{not json}\n");
        assert!(t.recv().unwrap_err().to_string().contains("Malformed"));
    }

    #[test]
    fn stdio_send_writes_newline_delimited_frames() {
        let (mut t, out) = stdio_pair("");
        t.send(&Frame::Result { value: json!(2) }).unwrap();
        let written = String::from_utf8(out.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "{\"tag\":\"result\",\"value\":2}\n");
    }

    #[test]
    fn stdio_binding_has_no_redirect_or_decref() {
        let (t, _) = stdio_pair("");
        assert!(!t.redirects_output());
        assert!(!t.supports_decref());
    }

    #[test]
    fn socket_binding_roundtrips_frames() {
        let (a, b) = UnixStream::pair().expect("socket pair");
        let mut kernel = Transport::from_stream(a).unwrap();
        let mut peer = Transport::from_stream(b).unwrap();
        assert!(kernel.redirects_output());
        assert!(kernel.supports_decref());

        peer.send(&Frame::Result { value: json!(1) }).unwrap();
        assert_eq!(kernel.recv().unwrap(), json!({"tag": "result", "value": 1}));

        kernel
            .send(&Frame::Stdout {
                text: "hi\n".to_string(),
            })
            .unwrap();
        assert_eq!(
            peer.recv().unwrap(),
            json!({"tag": "stdout", "text": "hi\n"})
        );
    }
}
