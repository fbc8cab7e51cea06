//! Outgoing HTTP message boundary
//!
//! The minimal request-message shape the socket transport can put on the
//! wire: request line, ordered headers, and a body that is piped rather than
//! buffered. The full HTTP object model lives outside this crate; this is
//! its boundary.

use std::io::Read;

/// Body source for an outgoing message
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    /// Streamed from the reader at send time, never fully buffered
    Reader(Box<dyn Read + Send>),
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Empty => write!(f, "Body::Empty"),
            Body::Bytes(b) => write!(f, "Body::Bytes({} bytes)", b.len()),
            Body::Reader(_) => write!(f, "Body::Reader"),
        }
    }
}

/// An outgoing HTTP request message
#[derive(Debug)]
pub struct HttpMessage {
    method: String,
    target: String,
    version: String,
    /// Insertion order is preserved on the wire
    headers: Vec<(String, String)>,
    body: Body,
}

impl HttpMessage {
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            version: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    /// Append a header, replacing an existing one with the same name
    pub fn header(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        let value = value.to_string();
        if let Some(existing) = self.headers.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = value;
        } else {
            self.headers.push((name, value));
        }
        self
    }

    pub fn body_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.body = Body::Bytes(bytes);
        self
    }

    pub fn body_reader(mut self, reader: Box<dyn Read + Send>) -> Self {
        self.body = Body::Reader(reader);
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Render request line and header block, terminated by the blank line.
    /// The body is not included; it is piped separately.
    pub fn render_head(&self) -> String {
        let mut head = format!("{} {} {}\r\n", self.method, self.target, self.version);
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head
    }

    /// Take the body out for sending
    pub fn take_body(&mut self) -> Body {
        std::mem::replace(&mut self.body, Body::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_head() {
        let msg = HttpMessage::new("GET", "/api/test")
            .header("Host", "example.com")
            .header("Accept", "*/*");

        let head = msg.render_head();
        assert!(head.starts_with("GET /api/test HTTP/1.1\r\n"));
        assert!(head.contains("Host: example.com\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_header_replaces_same_name() {
        let msg = HttpMessage::new("GET", "/")
            .header("X-Token", "one")
            .header("X-Token", "two");

        assert_eq!(msg.headers().len(), 1);
        assert_eq!(msg.headers()[0].1, "two");
    }

    #[test]
    fn test_header_order_preserved() {
        let msg = HttpMessage::new("POST", "/upload")
            .header("Host", "a")
            .header("Content-Type", "text/plain")
            .header("Content-Length", 3);

        let head = msg.render_head();
        let host = head.find("Host:").unwrap();
        let ctype = head.find("Content-Type:").unwrap();
        let clen = head.find("Content-Length:").unwrap();
        assert!(host < ctype && ctype < clen);
    }
}
