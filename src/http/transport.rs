//! HTTP/1.1 client built directly on a byte-oriented socket
//!
//! [`HttpTransport`] implements the [`Connection`] contract by speaking
//! HTTP/1.1 over a [`NetStream`]: it writes the normalized request
//! expression, reads status line and headers off the wire, then picks one of
//! three body-termination strategies (Content-Length, chunked,
//! connection-close). The received bytes are preserved verbatim, so the
//! result can be replayed byte-exactly or decoded into a plain body.

use std::io::{self, Write};
use std::time::Duration;

use crate::connection::Connection;
use crate::error::{Result, TransportError};
use crate::http::message::{Body, HttpMessage};
use crate::http::parse::{decode_chunked, parse_chunk_size, parse_response_head, ResponseHead};
use crate::options::{ActiveOptions, HttpOptions};
use crate::stream::{ByteStream, MemoryStream, NetStream};

/// Bound on a single header or chunk-size line read; longer lines are
/// consumed in pieces so malformed input cannot balloon memory.
pub const MAX_HEADER_LINE: usize = 255;

/// Request expression accepted by the socket transport
pub enum Expr {
    /// An outgoing HTTP message: head rendered first, body piped after
    Message(HttpMessage),
    /// A raw byte source, sent from its current read position (not rewound)
    Stream(Box<dyn ByteStream>),
    /// A plain string, wrapped in a seekable in-memory stream at position 0
    Text(String),
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Message(m) => write!(f, "Expr::Message({} {})", m.method(), m.target()),
            Expr::Stream(_) => write!(f, "Expr::Stream"),
            Expr::Text(s) => write!(f, "Expr::Text({} bytes)", s.len()),
        }
    }
}

impl From<HttpMessage> for Expr {
    fn from(msg: HttpMessage) -> Self {
        Expr::Message(msg)
    }
}

impl From<String> for Expr {
    fn from(text: String) -> Self {
        Expr::Text(text)
    }
}

impl From<&str> for Expr {
    fn from(text: &str) -> Self {
        Expr::Text(text.to_string())
    }
}

/// Callback fired when response headers have been parsed; returning `false`
/// vetoes body reading and finalizes the response as headers-only (used for
/// HEAD responses).
pub type HeadersHook = Box<dyn FnMut(&ResponseHead) -> bool + Send>;

/// A complete response read off the wire.
///
/// `raw` holds a byte-exact copy of everything received: header block, blank
/// line and body as transmitted (chunk framing included for chunked bodies).
#[derive(Debug, Clone)]
pub struct WireResponse {
    head: ResponseHead,
    raw: Vec<u8>,
    head_len: usize,
}

impl WireResponse {
    pub(crate) fn new(head: ResponseHead, raw: Vec<u8>, head_len: usize) -> Self {
        Self {
            head,
            raw,
            head_len,
        }
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn status(&self) -> u16 {
        self.head.status
    }

    /// Case-sensitive lookup, as parsed
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.header(name)
    }

    /// Everything received, byte-identical to the wire
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Byte-exact reconstruction of headers plus body, rewound to the start
    pub fn raw_stream(&self) -> MemoryStream {
        MemoryStream::from_bytes(self.raw.clone())
    }

    /// The body exactly as transmitted (still chunk-framed when chunked)
    pub fn body_raw(&self) -> &[u8] {
        &self.raw[self.head_len..]
    }

    /// The decoded body: dechunked when the response was chunked, otherwise
    /// the wire bytes after the header blank line.
    pub fn body_bytes(&self) -> Result<Vec<u8>> {
        if self.head.is_chunked() {
            Ok(decode_chunked(self.body_raw())?.concat())
        } else {
            Ok(self.body_raw().to_vec())
        }
    }

    /// The decoded body as a stream positioned at the start
    pub fn body_stream(&self) -> Result<MemoryStream> {
        Ok(MemoryStream::from_bytes(self.body_bytes()?))
    }
}

/// HTTP/1.1 transport over a plain or TLS socket
pub struct HttpTransport {
    options: HttpOptions,
    active: Option<ActiveOptions>,
    stream: Option<NetStream>,
    expr: Option<Expr>,
    last_receive: Option<WireResponse>,
    on_headers: Option<HeadersHook>,
}

impl HttpTransport {
    pub fn new(options: HttpOptions) -> Self {
        Self {
            options,
            active: None,
            stream: None,
            expr: None,
            last_receive: None,
            on_headers: None,
        }
    }

    /// The mutable, pre-connect options. Changes take effect on the next
    /// `connect`; a live connection keeps its frozen snapshot.
    pub fn options(&self) -> &HttpOptions {
        &self.options
    }

    /// Replace the pre-connect options; does not touch a live connection
    pub fn set_options(&mut self, options: HttpOptions) {
        self.options = options;
    }

    /// The frozen snapshot the current connection was built with
    pub fn active_options(&self) -> Option<&ActiveOptions> {
        self.active.as_ref()
    }

    /// Register the headers-received hook; see [`HeadersHook`]
    pub fn on_headers_received(&mut self, hook: HeadersHook) {
        self.on_headers = Some(hook);
    }

    fn write_expression(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let expr = self.expr.as_mut().ok_or(TransportError::NoExpression)?;

        match expr {
            // fast path: strings go straight onto the socket
            Expr::Text(text) => {
                stream.write_all(text.as_bytes())?;
                stream.flush()?;
            }
            // sent from the current read position so repeated partial
            // sends compose; explicitly not rewound
            Expr::Stream(source) => {
                source.pipe_to(stream, None)?;
                stream.flush()?;
            }
            Expr::Message(msg) => {
                let head = msg.render_head();
                stream.write_all(head.as_bytes())?;
                match msg.take_body() {
                    Body::Empty => {}
                    Body::Bytes(bytes) => stream.write_all(&bytes)?,
                    Body::Reader(mut reader) => {
                        io::copy(&mut reader, stream)?;
                    }
                }
                stream.flush()?;
            }
        }

        Ok(())
    }

    fn read_chunked_body(
        stream: &mut NetStream,
        raw: &mut Vec<u8>,
        timeout: Duration,
    ) -> Result<()> {
        loop {
            let Some(line) = stream
                .read_line(MAX_HEADER_LINE)
                .map_err(|e| map_read_error(e, timeout))?
            else {
                // connection lost mid-body; surface what we have
                break;
            };

            // chunk framing is preserved verbatim in the output
            raw.extend_from_slice(&line);

            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                // the CRLF that terminates the previous chunk's data
                continue;
            }

            let size = parse_chunk_size(trimmed)?;
            if size == 0 {
                // copy the trailing empty-line terminator as well
                if let Some(end) = stream
                    .read_line(MAX_HEADER_LINE)
                    .map_err(|e| map_read_error(e, timeout))?
                {
                    raw.extend_from_slice(&end);
                }
                break;
            }

            stream
                .pipe_to(raw, Some(size))
                .map_err(|e| map_read_error(e, timeout))?;
        }

        Ok(())
    }
}

impl Connection for HttpTransport {
    type Expr = Expr;
    type Output = WireResponse;

    fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            self.close();
        }

        let active = self.options.freeze()?;
        tracing::debug!(address = %active.wrapper_address(), "connecting");
        let stream = NetStream::connect(&active)?;

        self.active = Some(active);
        self.stream = Some(stream);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_alive())
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
        self.active = None;
        self.last_receive = None;
    }

    fn request(&mut self, expr: Expr) {
        self.expr = Some(expr);
    }

    fn has_request(&self) -> bool {
        self.expr.is_some()
    }

    fn do_send(&mut self) -> Result<WireResponse> {
        // a new send invalidates the cached response
        self.last_receive = None;

        let address = self
            .active
            .as_ref()
            .map(|a| a.address().to_string())
            .unwrap_or_default();

        self.write_expression()
            .map_err(|e| TransportError::send_expression(address, e))?;

        self.receive()
    }

    fn receive(&mut self) -> Result<WireResponse> {
        if let Some(cached) = &self.last_receive {
            return Ok(cached.clone());
        }

        let timeout = self
            .active
            .as_ref()
            .map(|a| a.timeout())
            .unwrap_or_default();
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        // 1. header block, line by line, bounded per line
        let mut raw: Vec<u8> = Vec::new();
        loop {
            match stream
                .read_line(MAX_HEADER_LINE)
                .map_err(|e| map_read_error(e, timeout))?
            {
                None => break,
                Some(line) => {
                    let blank = line == b"\r\n" || line == b"\n";
                    raw.extend_from_slice(&line);
                    if blank {
                        break;
                    }
                }
            }
        }

        if raw.is_empty() {
            return Err(TransportError::ServerNotUnderstand);
        }

        // 2-3. status line and headers; parse failures are fatal
        let head_len = raw.len();
        let head_text = String::from_utf8_lossy(&raw).into_owned();
        let head = parse_response_head(&head_text)?;
        tracing::debug!(status = head.status, version = %head.version, "headers received");

        // 4. collaborators may veto body reading (e.g. HEAD responses)
        let read_body = match self.on_headers.as_mut() {
            Some(hook) => hook(&head),
            None => true,
        };

        // 5. body termination strategy, in priority order
        if read_body {
            if let Some(length) = head.content_length() {
                stream
                    .pipe_to(&mut raw, Some(length))
                    .map_err(|e| map_read_error(e, timeout))?;
            } else if head.is_chunked() {
                Self::read_chunked_body(stream, &mut raw, timeout)?;
            } else {
                // connection-close-delimited body
                stream
                    .pipe_to(&mut raw, None)
                    .map_err(|e| map_read_error(e, timeout))?;
            }
        }

        // 6. final response value, cached for idempotent redelivery
        let response = WireResponse::new(head, raw, head_len);
        self.last_receive = Some(response.clone());
        Ok(response)
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Classify a read/write failure: configured-timeout expiry must be
/// distinguishable from a protocol error.
fn map_read_error(e: io::Error, limit: Duration) -> TransportError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout {
            elapsed: limit,
            limit,
        },
        _ => TransportError::Io(e),
    }
}
