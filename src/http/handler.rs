//! The seam between decrypted plaintext and the HTTP layer.
//!
//! # Responsibilities
//! - Consume complete requests from the decrypted buffer
//! - Produce response bytes, or a short-circuit error response
//! - Decide whether the connection stays open afterwards
//!
//! # Design Decisions
//! - Short-circuit responses are ordinary return values, never panics
//! - Header size limits enforced before waiting for a body
//! - Only the bytes of one request are consumed per call

use bytes::{Buf, Bytes, BytesMut};

/// What the connection should do after the handler looked at its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The buffered input does not hold a complete request yet.
    NeedMore,
    /// Send these bytes and keep reading.
    Respond(Bytes),
    /// Send these bytes, then close the connection.
    RespondAndClose(Bytes),
    /// The input is unacceptable. Send these bytes, discard the input and
    /// close the connection.
    Reject(Bytes),
}

/// Consumes decrypted request bytes.
pub trait HttpHandler: Send {
    /// Inspect `input`, advancing past whatever was consumed.
    fn on_plaintext(&mut self, input: &mut BytesMut) -> HandlerOutcome;
}

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
pub const DEFAULT_MAX_HEAD: usize = 16 * 1024;
pub const DEFAULT_MAX_BODY: usize = 1024 * 1024;

/// Serialize a minimal HTTP/1.1 response.
pub fn response(status: u16, reason: &str, body: &[u8], close: bool) -> Bytes {
    let mut out = BytesMut::with_capacity(128 + body.len());
    out.extend_from_slice(format!("HTTP/1.1 {status} {reason}\r\n").as_bytes());
    out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    if !body.is_empty() {
        out.extend_from_slice(b"Content-Type: text/plain; charset=utf-8\r\n");
    }
    if close {
        out.extend_from_slice(b"Connection: close\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out.freeze()
}

fn find_head_end(input: &[u8]) -> Option<usize> {
    input
        .windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|pos| pos + HEAD_TERMINATOR.len())
}

#[derive(Debug, PartialEq, Eq)]
struct RequestHead {
    method: String,
    version: String,
    content_length: usize,
    keep_alive: bool,
}

fn parse_head(head: &[u8]) -> Option<RequestHead> {
    let text = std::str::from_utf8(head).ok()?;
    let mut lines = text.split("\r\n");

    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next().filter(|m| !m.is_empty())?;
    let _target = request_line.next().filter(|t| !t.is_empty())?;
    let version = request_line.next()?;
    if request_line.next().is_some() || !version.starts_with("HTTP/1.") {
        return None;
    }

    // Framing is Content-Length only. Chunked bodies and repeated lengths
    // are refused rather than guessed at.
    let mut content_length = None;
    let mut connection = None;
    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = line.split_once(':')?;
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            if content_length.is_some() {
                return None;
            }
            content_length = Some(value.parse().ok()?);
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            return None;
        } else if name.eq_ignore_ascii_case("connection") {
            connection = Some(value.to_ascii_lowercase());
        }
    }

    let keep_alive = match (version, connection.as_deref()) {
        (_, Some("close")) => false,
        ("HTTP/1.0", Some("keep-alive")) => true,
        ("HTTP/1.0", _) => false,
        _ => true,
    };

    Some(RequestHead {
        method: method.to_string(),
        version: version.to_string(),
        content_length: content_length.unwrap_or(0),
        keep_alive,
    })
}

/// Answers every well-formed request with the same response.
#[derive(Debug, Clone)]
pub struct StaticResponder {
    body: Bytes,
    max_head: usize,
    max_body: usize,
    served: u64,
}

impl StaticResponder {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            max_head: DEFAULT_MAX_HEAD,
            max_body: DEFAULT_MAX_BODY,
            served: 0,
        }
    }

    pub fn with_limits(mut self, max_head: usize, max_body: usize) -> Self {
        self.max_head = max_head;
        self.max_body = max_body;
        self
    }

    /// Requests answered so far on this connection.
    pub fn served(&self) -> u64 {
        self.served
    }
}

impl Default for StaticResponder {
    fn default() -> Self {
        Self::new(Bytes::from_static(b"OK\n"))
    }
}

impl HttpHandler for StaticResponder {
    fn on_plaintext(&mut self, input: &mut BytesMut) -> HandlerOutcome {
        let Some(head_end) = find_head_end(input) else {
            if input.len() > self.max_head {
                tracing::warn!(buffered = input.len(), "Request head too large");
                input.clear();
                return HandlerOutcome::Reject(response(
                    431,
                    "Request Header Fields Too Large",
                    b"",
                    true,
                ));
            }
            return HandlerOutcome::NeedMore;
        };

        let Some(head) = parse_head(&input[..head_end]) else {
            tracing::warn!("Malformed request head");
            input.clear();
            return HandlerOutcome::Reject(response(400, "Bad Request", b"", true));
        };

        if head.content_length > self.max_body {
            tracing::warn!(content_length = head.content_length, "Request body too large");
            input.clear();
            return HandlerOutcome::Reject(response(413, "Payload Too Large", b"", true));
        }
        if input.len() < head_end + head.content_length {
            return HandlerOutcome::NeedMore;
        }
        input.advance(head_end + head.content_length);
        self.served += 1;

        tracing::debug!(
            method = %head.method,
            version = %head.version,
            keep_alive = head.keep_alive,
            "Request served"
        );

        let close = !head.keep_alive;
        let reply = if head.method == "HEAD" {
            head_reply(self.body.len(), close)
        } else {
            response(200, "OK", &self.body, close)
        };

        if head.keep_alive {
            HandlerOutcome::Respond(reply)
        } else {
            HandlerOutcome::RespondAndClose(reply)
        }
    }
}

/// HEAD advertises the length a GET would have returned.
fn head_reply(content_length: usize, close: bool) -> Bytes {
    let mut out = format!("HTTP/1.1 200 OK\r\nContent-Length: {content_length}\r\n");
    if close {
        out.push_str("Connection: close\r\n");
    }
    out.push_str("\r\n");
    Bytes::from(out)
}
