//! Byte stream abstraction consumed by the transport
//!
//! [`ByteStream`] is the contract the wire engine reads and writes against:
//! bounded line reads, bulk reads, bulk copy, EOF/liveness queries and seek
//! where the backing store supports it. Two implementations are provided:
//! [`MemoryStream`] (seekable buffer) and [`NetStream`] (live TCP or TLS
//! socket built from a frozen options snapshot).

use std::io::{self, BufRead, BufReader, Cursor, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use native_tls::{HandshakeError, TlsConnector, TlsStream};

use crate::error::{Result, TransportError};
use crate::options::{ActiveOptions, Wrapper};

/// Bidirectional byte channel with line-oriented reads
pub trait ByteStream: Send {
    /// Read bytes up to and including the next `\n`, bounded to `max_len`
    /// bytes so malformed input cannot balloon memory. Returns `None` at EOF
    /// when nothing was read. A returned slice without a trailing `\n` means
    /// either the bound was hit or the stream ended mid-line.
    fn read_line(&mut self, max_len: usize) -> io::Result<Option<Vec<u8>>>;

    /// Read up to `n` bytes; shorter only at EOF
    fn read_bytes(&mut self, n: usize) -> io::Result<Vec<u8>>;

    /// Write bytes at the current position
    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Copy bytes from the current position into `sink`, at most `max` when
    /// given, otherwise until EOF. Returns the number of bytes copied.
    fn pipe_to(&mut self, sink: &mut dyn Write, max: Option<u64>) -> io::Result<u64>;

    /// Whether the read position is at end of stream
    fn is_eof(&self) -> bool;

    /// Current read offset in bytes
    fn offset(&self) -> u64;

    /// Move the read position; errors on non-seekable streams
    fn seek(&mut self, pos: u64) -> io::Result<u64>;

    /// Whether the underlying resource is still usable
    fn is_alive(&self) -> bool;

    /// Release the underlying resource; safe to call repeatedly
    fn close(&mut self);
}

/// Bounded line read shared by the stream implementations.
fn read_line_bounded<R: BufRead>(reader: &mut R, max_len: usize) -> io::Result<Option<Vec<u8>>> {
    let mut line = Vec::new();

    while line.len() < max_len {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            break;
        }

        let limit = max_len - line.len();
        let take = &available[..available.len().min(limit)];

        if let Some(pos) = take.iter().position(|&b| b == b'\n') {
            line.extend_from_slice(&take[..=pos]);
            reader.consume(pos + 1);
            return Ok(Some(line));
        }

        let used = take.len();
        line.extend_from_slice(take);
        reader.consume(used);
    }

    if line.is_empty() {
        Ok(None)
    } else {
        Ok(Some(line))
    }
}

/// Seekable in-memory byte stream
#[derive(Debug, Default)]
pub struct MemoryStream {
    cursor: Cursor<Vec<u8>>,
    closed: bool,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing bytes, positioned at the start
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(bytes),
            closed: false,
        }
    }

    pub fn from_str(text: &str) -> Self {
        Self::from_bytes(text.as_bytes().to_vec())
    }

    /// Rewind to position 0
    pub fn rewind(&mut self) -> &mut Self {
        self.cursor.set_position(0);
        self
    }

    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }

    /// Whole backing buffer regardless of position
    pub fn bytes(&self) -> &[u8] {
        self.cursor.get_ref()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.cursor.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ByteStream for MemoryStream {
    fn read_line(&mut self, max_len: usize) -> io::Result<Option<Vec<u8>>> {
        read_line_bounded(&mut self.cursor, max_len)
    }

    fn read_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut out = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let got = self.cursor.read(&mut out[filled..])?;
            if got == 0 {
                break;
            }
            filled += got;
        }
        out.truncate(filled);
        Ok(out)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.cursor.write(buf)
    }

    fn pipe_to(&mut self, sink: &mut dyn Write, max: Option<u64>) -> io::Result<u64> {
        let mut copied = 0u64;
        let mut chunk = [0u8; 8192];
        loop {
            let want = match max {
                Some(limit) if copied >= limit => break,
                Some(limit) => chunk.len().min((limit - copied) as usize),
                None => chunk.len(),
            };
            let got = self.cursor.read(&mut chunk[..want])?;
            if got == 0 {
                break;
            }
            sink.write_all(&chunk[..got])?;
            copied += got as u64;
        }
        Ok(copied)
    }

    fn is_eof(&self) -> bool {
        self.cursor.position() >= self.cursor.get_ref().len() as u64
    }

    fn offset(&self) -> u64 {
        self.cursor.position()
    }

    fn seek(&mut self, pos: u64) -> io::Result<u64> {
        self.cursor.set_position(pos);
        Ok(pos)
    }

    fn is_alive(&self) -> bool {
        !self.closed
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

enum Conn {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Conn {
    fn tcp(&self) -> &TcpStream {
        match self {
            Conn::Tcp(s) => s,
            Conn::Tls(s) => s.get_ref(),
        }
    }
}

impl Read for Conn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Conn::Tcp(s) => s.read(buf),
            Conn::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Conn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Conn::Tcp(s) => s.write(buf),
            Conn::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Conn::Tcp(s) => s.flush(),
            Conn::Tls(s) => s.flush(),
        }
    }
}

/// Live socket stream, plain TCP or TLS-wrapped per the frozen options
pub struct NetStream {
    reader: BufReader<Conn>,
    read_count: u64,
    eof: bool,
    closed: bool,
}

impl NetStream {
    /// Open a socket per the frozen options snapshot: resolve the host,
    /// connect with the configured timeout, apply blocking mode and wrap in
    /// TLS when the scheme table says so.
    pub fn connect(opts: &ActiveOptions) -> Result<NetStream> {
        let target = opts.wrapper_address();

        let addr = (opts.host(), opts.port())
            .to_socket_addrs()
            .map_err(|e| TransportError::connect(&target, e))?
            .next()
            .ok_or_else(|| TransportError::Connect {
                address: target.clone(),
                reason: "host resolved to no addresses".to_string(),
                source: None,
            })?;

        tracing::debug!(address = %target, timeout = ?opts.timeout(), "opening socket");

        let tcp = TcpStream::connect_timeout(&addr, opts.timeout())
            .map_err(|e| TransportError::connect(&target, e))?;

        if opts.is_non_blocking() {
            tcp.set_nonblocking(true)
                .map_err(|e| TransportError::connect(&target, e))?;
        } else {
            tcp.set_read_timeout(Some(opts.timeout()))
                .map_err(|e| TransportError::connect(&target, e))?;
            tcp.set_write_timeout(Some(opts.timeout()))
                .map_err(|e| TransportError::connect(&target, e))?;
        }

        if opts.is_persist() {
            // advisory only; std sockets have no OS-level connection reuse
            tracing::trace!(address = %target, "persistent connection requested");
        }

        let conn = match opts.wrapper() {
            Wrapper::Tcp => Conn::Tcp(tcp),
            Wrapper::Ssl => {
                let tls = opts.tls();
                let connector = TlsConnector::builder()
                    .danger_accept_invalid_certs(!tls.verify_certificates)
                    .danger_accept_invalid_hostnames(!tls.verify_hostname)
                    .build()?;
                let stream = connector.connect(opts.host(), tcp).map_err(|e| match e {
                    HandshakeError::Failure(e) => TransportError::Tls(e),
                    HandshakeError::WouldBlock(_) => TransportError::Io(io::Error::new(
                        io::ErrorKind::WouldBlock,
                        "TLS handshake would block",
                    )),
                })?;
                Conn::Tls(Box::new(stream))
            }
        };

        Ok(NetStream {
            reader: BufReader::new(conn),
            read_count: 0,
            eof: false,
            closed: false,
        })
    }
}

impl Write for NetStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.reader.get_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.reader.get_mut().flush()
    }
}

impl ByteStream for NetStream {
    fn read_line(&mut self, max_len: usize) -> io::Result<Option<Vec<u8>>> {
        let line = read_line_bounded(&mut self.reader, max_len)?;
        match &line {
            None => self.eof = true,
            Some(bytes) => {
                self.read_count += bytes.len() as u64;
                // a short line without its delimiter means the stream ended
                if bytes.len() < max_len && !bytes.ends_with(b"\n") {
                    self.eof = true;
                }
            }
        }
        Ok(line)
    }

    fn read_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut out = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let got = self.reader.read(&mut out[filled..])?;
            if got == 0 {
                self.eof = true;
                break;
            }
            filled += got;
        }
        self.read_count += filled as u64;
        out.truncate(filled);
        Ok(out)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.reader.get_mut().write(buf)?;
        self.reader.get_mut().flush()?;
        Ok(n)
    }

    fn pipe_to(&mut self, sink: &mut dyn Write, max: Option<u64>) -> io::Result<u64> {
        let mut copied = 0u64;
        let mut chunk = [0u8; 8192];
        loop {
            let want = match max {
                Some(limit) if copied >= limit => break,
                Some(limit) => chunk.len().min((limit - copied) as usize),
                None => chunk.len(),
            };
            let got = self.reader.read(&mut chunk[..want])?;
            if got == 0 {
                self.eof = true;
                break;
            }
            sink.write_all(&chunk[..got])?;
            copied += got as u64;
        }
        self.read_count += copied;
        Ok(copied)
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    fn offset(&self) -> u64 {
        self.read_count
    }

    fn seek(&mut self, _pos: u64) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "socket streams are not seekable",
        ))
    }

    fn is_alive(&self) -> bool {
        !self.closed && !self.eof
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        let _ = self.reader.get_ref().tcp().shutdown(std::net::Shutdown::Both);
        self.closed = true;
    }
}

impl Drop for NetStream {
    fn drop(&mut self) {
        self.close();
    }
}
