//! Newline-delimited framing with a hard cap on frame size.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::protocol::RequestId;

/// One read from the stream.
#[derive(Debug, PartialEq)]
pub(crate) enum Frame {
    /// A complete frame, trimmed and non-empty.
    Text(String),
    /// A frame over the cap. Only its head was buffered; the rest was
    /// skipped. `id` is the top-level request id, when the head carries it.
    Oversized { size: usize, id: Option<RequestId> },
}

/// Reads frames without ever buffering more than `max + 1` bytes of one.
pub(crate) struct FrameReader<R> {
    inner: BufReader<R>,
    max: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub(crate) fn new(reader: R, max: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            max,
        }
    }

    /// Next non-blank frame, or `None` at end of stream.
    pub(crate) async fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        loop {
            let mut buf = Vec::new();
            // One extra byte for the terminator
            let limit = self.max as u64 + 1;
            let n = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut buf)
                .await?;
            if n == 0 {
                return Ok(None);
            }

            if buf.last() == Some(&b'\n') || buf.len() <= self.max {
                let text = String::from_utf8_lossy(&buf);
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                return Ok(Some(Frame::Text(text.to_string())));
            }

            let id = recover_id(&buf);
            let rest = self.skip_line().await?;
            return Ok(Some(Frame::Oversized {
                size: buf.len() + rest,
                id,
            }));
        }
    }

    /// Discard through the next newline. Returns the bytes skipped, newline
    /// excluded.
    async fn skip_line(&mut self) -> io::Result<usize> {
        let mut skipped = 0;
        loop {
            let (consumed, done) = {
                let available = self.inner.fill_buf().await?;
                if available.is_empty() {
                    return Ok(skipped);
                }
                match available.iter().position(|b| *b == b'\n') {
                    Some(i) => (i + 1, true),
                    None => (available.len(), false),
                }
            };
            self.inner.consume(consumed);
            if done {
                return Ok(skipped + consumed - 1);
            }
            skipped += consumed;
        }
    }
}

/// The top-level `"id"` of a possibly truncated JSON object.
pub(crate) fn recover_id(head: &[u8]) -> Option<RequestId> {
    let mut depth = 0usize;
    let mut i = 0;
    while i < head.len() {
        match head[i] {
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.saturating_sub(1),
            b'"' => {
                let end = string_end(head, i)?;
                if depth == 1 && &head[i + 1..end] == b"id" {
                    let rest = skip_space(&head[end + 1..]);
                    if let Some(rest) = rest.strip_prefix(b":") {
                        return parse_id(skip_space(rest));
                    }
                }
                i = end;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn string_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn skip_space(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn parse_id(bytes: &[u8]) -> Option<RequestId> {
    if bytes.first() == Some(&b'"') {
        let end = string_end(bytes, 0)?;
        return serde_json::from_slice::<String>(&bytes[..=end])
            .ok()
            .map(RequestId::String);
    }
    let len = bytes
        .iter()
        .position(|b| !(b.is_ascii_digit() || *b == b'-'))
        .unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..len])
        .ok()?
        .parse::<i64>()
        .ok()
        .map(RequestId::Number)
}
