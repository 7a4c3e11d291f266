//! Content-Length message framing for the socket binding.
//!
//! HTTP-style framing, the same shape the Language Server Protocol uses,
//! giving reliable whole-message boundaries over stream sockets:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <message-body>
//! ```
//!
//! Header parsing is case-insensitive and handles both CRLF and LF line
//! endings. Framing failures here are transport-fatal by design; callers
//! do not retry.

use std::io::{BufRead, Read, Write};

use anyhow::{anyhow, Context, Result};

/// Maximum message size (100MB) to prevent OOM from a buggy peer.
const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Read one Content-Length framed message.
///
/// # Errors
///
/// Returns an error if:
/// - The stream is closed (EOF)
/// - No Content-Length header is found
/// - Content-Length exceeds MAX_MESSAGE_SIZE
/// - The body cannot be read completely or is not valid UTF-8
pub fn read_message(reader: &mut impl BufRead) -> Result<String> {
    // Read headers until blank line
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes_read = reader
            .read_line(&mut line)
            .context("Failed to read header line")?;

        // EOF - connection closed
        if bytes_read == 0 {
            return Err(anyhow!("Connection closed by peer"));
        }

        // Trim both CRLF and LF line endings
        let trimmed = line.trim();

        // Empty line signals end of headers
        if trimmed.is_empty() {
            break;
        }

        // Parse Content-Length header (case-insensitive per HTTP spec)
        if let Some(colon_pos) = trimmed.find(':') {
            let key = trimmed[..colon_pos].trim();
            let value = trimmed[colon_pos + 1..].trim();

            if key.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid Content-Length value: {}", value))?,
                );
            }
            // Ignore other headers (e.g., Content-Type)
        }
    }

    let size = content_length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;

    if size > MAX_MESSAGE_SIZE {
        return Err(anyhow!(
            "Message size {} exceeds maximum {} bytes",
            size,
            MAX_MESSAGE_SIZE
        ));
    }

    let mut body = vec![0u8; size];
    reader
        .read_exact(&mut body)
        .context("Failed to read message body")?;

    String::from_utf8(body).context("Message body is not valid UTF-8")
}

/// Write one Content-Length framed message and flush it, so notification
/// frames are observed as they occur.
pub fn write_message(writer: &mut impl Write, body: &str) -> Result<()> {
    let body_bytes = body.as_bytes();
    let header = format!("Content-Length: {}\r\n\r\n", body_bytes.len());

    writer
        .write_all(header.as_bytes())
        .context("Failed to write message header")?;

    writer
        .write_all(body_bytes)
        .context("Failed to write message body")?;

    writer.flush().context("Failed to flush message")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn write_read_roundtrip() {
        let message = r#"{"tag":"exec","code":"ans = 1"}"#;
        let mut buf = Vec::new();
        write_message(&mut buf, message).expect("Write failed");

        let mut reader = BufReader::new(buf.as_slice());
        let received = read_message(&mut reader).expect("Read failed");
        assert_eq!(received, message);
    }

    #[test]
    fn read_missing_content_length() {
        let mut reader = BufReader::new(&b"\r\n"[..]);
        let result = read_message(&mut reader);
        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(
            err_msg.contains("Missing Content-Length"),
            "Expected 'Missing Content-Length' error, got: {}",
            err_msg
        );
    }

    #[test]
    fn read_handles_lf_only_endings() {
        let body = r#"{"test":true}"#;
        let raw = format!("Content-Length: {}\n\n{}", body.len(), body);
        let mut reader = BufReader::new(raw.as_bytes());
        assert_eq!(read_message(&mut reader).unwrap(), body);
    }

    #[test]
    fn read_case_insensitive_header() {
        let body = r#"{"test":true}"#;
        let raw = format!("content-length: {}\r\n\r\n{}", body.len(), body);
        let mut reader = BufReader::new(raw.as_bytes());
        assert_eq!(read_message(&mut reader).unwrap(), body);
    }

    #[test]
    fn read_rejects_oversized_message() {
        let raw = format!("Content-Length: {}\r\n\r\n", MAX_MESSAGE_SIZE + 1);
        let mut reader = BufReader::new(raw.as_bytes());
        let result = read_message(&mut reader);
        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(
            err_msg.contains("exceeds maximum"),
            "Expected size error, got: {}",
            err_msg
        );
    }

    #[test]
    fn closed_stream_returns_error() {
        let mut reader = BufReader::new(&b""[..]);
        let result = read_message(&mut reader);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("closed"));
    }

    #[test]
    fn truncated_body_is_an_error() {
        let raw = "Content-Length: 10\r\n\r\nshort";
        let mut reader = BufReader::new(raw.as_bytes());
        assert!(read_message(&mut reader).is_err());
    }
}
