//! Wire encoding for MCP messages.
//!
//! Stdio servers speak Content-Length framed JSON:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! {"jsonrpc": "2.0", "id": 1, "method": "...", "params": {...}}
//! ```
//!
//! Some servers skip the header and write one JSON document per line, so the
//! reader accepts both. SSE streams are decoded line by line with
//! [`SseParser`].

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcMessage, JsonRpcRequest};

const CONTENT_LENGTH: &str = "content-length:";

/// Largest framed body the reader will accept.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Serialize a request to compact JSON.
pub fn encode(message: &JsonRpcRequest) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Serialize a request with its Content-Length header.
pub fn encode_framed(message: &JsonRpcRequest) -> Result<Vec<u8>> {
    let json = encode(message)?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", json.len()).into_bytes();
    frame.extend_from_slice(json.as_bytes());
    Ok(frame)
}

/// Parse one inbound JSON document.
pub fn decode(text: &str) -> Result<JsonRpcMessage> {
    Ok(serde_json::from_str(text)?)
}

/// Write one framed message and flush.
pub async fn write_message<W>(writer: &mut W, message: &JsonRpcRequest) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_framed(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;

    tracing::trace!(
        content_length = frame.len(),
        method = %message.method,
        "sent MCP message"
    );
    Ok(())
}

/// Read the next message from a stdio stream.
///
/// Returns `Ok(None)` at end of stream. Undecodable input is logged and
/// skipped. I/O failures and frames larger than [`MAX_FRAME_BYTES`] are
/// returned as errors; the stream cannot be resynchronised after either.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<JsonRpcMessage>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(len) = content_length(trimmed) {
            let len = match len {
                Ok(len) => len,
                Err(raw) => {
                    tracing::warn!(header = %raw, "invalid Content-Length header, skipping");
                    continue;
                }
            };

            if len > MAX_FRAME_BYTES {
                return Err(McpError::protocol(format!(
                    "frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit"
                )));
            }

            skip_headers(reader, &mut line).await?;

            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).await?;

            match serde_json::from_slice::<JsonRpcMessage>(&body) {
                Ok(message) => {
                    tracing::trace!(content_length = len, "received MCP message");
                    return Ok(Some(message));
                }
                Err(e) => {
                    tracing::warn!(
                        content_length = len,
                        error = %e,
                        "protocol error: framed body is not valid JSON-RPC, dropping"
                    );
                    continue;
                }
            }
        }

        // Header-less fallback: one JSON document per line.
        match decode(trimmed) {
            Ok(message) => return Ok(Some(message)),
            Err(_) => {
                tracing::trace!(line = %trimmed, "ignoring non-JSON line");
            }
        }
    }
}

/// Parse a `Content-Length:` header line. `Err` carries the bad value.
fn content_length(line: &str) -> Option<std::result::Result<usize, String>> {
    let prefix = line.get(..CONTENT_LENGTH.len())?;
    if !prefix.eq_ignore_ascii_case(CONTENT_LENGTH) {
        return None;
    }
    let value = line[CONTENT_LENGTH.len()..].trim();
    Some(value.parse().map_err(|_| value.to_string()))
}

/// Consume any remaining header lines up to and including the blank separator.
async fn skip_headers<R>(reader: &mut R, line: &mut String) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        line.clear();
        if reader.read_line(line).await? == 0 || line.trim().is_empty() {
            return Ok(());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server-Sent Events
// ─────────────────────────────────────────────────────────────────────────────

/// A decoded SSE event relevant to MCP.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// The server announced where requests should be POSTed.
    Endpoint(String),
    /// A JSON-RPC message.
    Message(JsonRpcMessage),
}

/// Incremental SSE decoder.
///
/// Feed it one line at a time (without the trailing newline). An event is
/// dispatched on the blank line that terminates it, or by [`finish`] at end
/// of stream.
///
/// [`finish`]: SseParser::finish
#[derive(Debug, Default)]
pub struct SseParser {
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one line.
    pub fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    /// Dispatch a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        self.dispatch()
    }

    /// Decode a complete SSE body.
    pub fn parse_body(body: &str) -> Vec<SseEvent> {
        let mut parser = Self::new();
        let mut events: Vec<SseEvent> = body.lines().filter_map(|l| parser.feed_line(l)).collect();
        events.extend(parser.finish());
        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");

        match event.as_deref() {
            Some("endpoint") => Some(SseEvent::Endpoint(data.trim().to_string())),
            other => match decode(&data) {
                Ok(message) => Some(SseEvent::Message(message)),
                Err(e) => {
                    tracing::debug!(
                        event = other.unwrap_or("message"),
                        error = %e,
                        "ignoring SSE event without a JSON-RPC payload"
                    );
                    None
                }
            },
        }
    }
}
