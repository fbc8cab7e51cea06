//! Wire parsing utilities
//!
//! Pure, stateless parsers for HTTP/1.x response framing: status line,
//! header lines, header blocks and chunk-size lines. The block parser comes
//! in two modes: the response-head parser uses [`ParseMode::Strict`] (any
//! unparsable line after the status line is fatal) while callers holding
//! header-only text can use [`ParseMode::Lenient`] which silently skips
//! unparsable lines.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, TransportError};

static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^HTTP/(?P<version>1\.[01]) (?P<status>\d{3})(?: +(?P<reason>.*))?$").unwrap()
});

/// Header field grammar; the name excludes `()<>@,;:\"/[]?={}` and whitespace
static HEADER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?P<label>[^()><@,;:"/\[\]?={} \t]+):(?P<value>.*)$"#).unwrap()
});

/// Parsed `HTTP/<ver> <status> [reason]` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: String,
    pub status: u16,
    pub reason: String,
}

/// Status line, headers and nothing else: the head of a parsed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub version: String,
    pub status: u16,
    pub reason: String,
    /// Header names are kept exactly as parsed; callers normalize case.
    /// The first occurrence of a repeated name is canonical.
    pub headers: HashMap<String, String>,
}

impl ResponseHead {
    /// Case-sensitive header lookup, as parsed off the wire
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Whether the body uses chunked transfer encoding
    pub fn is_chunked(&self) -> bool {
        self.header("Transfer-Encoding")
            .is_some_and(|v| v.contains("chunked"))
    }

    /// Declared body length, when one is present and numeric
    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length").and_then(|v| v.trim().parse().ok())
    }
}

/// How [`parse_header_block`] treats lines that don't match the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Error on any unparsable non-blank line; stop at the first blank line
    Strict,
    /// Skip unparsable lines silently
    Lenient,
}

/// Parse a status line; anything not matching
/// `HTTP/<1.0|1.1> <3-digit-status> [reason]` is fatal.
pub fn parse_status_line(line: &str) -> Result<StatusLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    let caps = STATUS_LINE
        .captures(line)
        .ok_or_else(|| TransportError::MalformedStatusLine {
            line: line.to_string(),
        })?;

    Ok(StatusLine {
        version: caps["version"].to_string(),
        // the pattern guarantees three digits
        status: caps["status"].parse().unwrap(),
        reason: caps
            .name("reason")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
    })
}

/// Split a single `Name: value` line; the primitive under the block parser.
///
/// Returns `None` when the line doesn't match the header grammar. The value
/// is trimmed.
pub fn split_label_value(line: &str) -> Option<(String, String)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let caps = HEADER_LINE.captures(line)?;
    Some((caps["label"].to_string(), caps["value"].trim().to_string()))
}

/// Parse a block of header lines into a name-to-value map.
///
/// The first occurrence of a repeated header name wins.
pub fn parse_header_block(text: &str, mode: ParseMode) -> Result<HashMap<String, String>> {
    let mut headers = HashMap::new();

    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            match mode {
                ParseMode::Strict => break,
                ParseMode::Lenient => continue,
            }
        }

        match split_label_value(line) {
            Some((label, value)) => {
                headers.entry(label).or_insert(value);
            }
            None => {
                if mode == ParseMode::Strict {
                    return Err(TransportError::MalformedHeader {
                        line: line.to_string(),
                    });
                }
            }
        }
    }

    Ok(headers)
}

/// Parse raw header text (status line plus header lines) into a
/// [`ResponseHead`]. Header lines are parsed strictly.
pub fn parse_response_head(text: &str) -> Result<ResponseHead> {
    let mut lines = text.splitn(2, '\n');

    let first = lines.next().unwrap_or_default();
    let status = parse_status_line(first)?;

    let rest = lines.next().unwrap_or_default();
    let headers = parse_header_block(rest, ParseMode::Strict)?;

    Ok(ResponseHead {
        version: status.version,
        status: status.status,
        reason: status.reason,
        headers,
    })
}

/// Decode a hexadecimal chunk-size line; chunk extensions after `;` are
/// ignored.
pub fn parse_chunk_size(line: &str) -> Result<u64> {
    let size = line
        .trim()
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();

    u64::from_str_radix(size, 16).map_err(|_| TransportError::MalformedChunk {
        line: line.to_string(),
    })
}

/// Decode a chunked body, preserving chunk boundaries.
///
/// Input is the raw wire form (size lines included); output is one entry per
/// chunk, terminated by the zero-size chunk. [`encode_chunked`] on the result
/// reproduces the original wire bytes.
pub fn decode_chunked(raw: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut chunks = Vec::new();
    let mut pos = 0;

    loop {
        let line_end = raw[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| TransportError::MalformedChunk {
                line: String::from_utf8_lossy(&raw[pos..]).into_owned(),
            })?;
        let line = String::from_utf8_lossy(&raw[pos..pos + line_end]).into_owned();
        pos += line_end + 1;

        let size = parse_chunk_size(&line)? as usize;
        if size == 0 {
            break;
        }

        if pos + size > raw.len() {
            return Err(TransportError::MalformedChunk { line });
        }
        chunks.push(raw[pos..pos + size].to_vec());
        pos += size;

        // each chunk is followed by its own CRLF
        while pos < raw.len() && (raw[pos] == b'\r' || raw[pos] == b'\n') {
            pos += 1;
            if raw[pos - 1] == b'\n' {
                break;
            }
        }
    }

    Ok(chunks)
}

/// Re-encode chunks into wire form with lowercase hex size lines.
pub fn encode_chunked(chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}
