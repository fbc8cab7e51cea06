//! Transport configuration
//!
//! Options live in two states: [`HttpOptions`] is the mutable, pre-connect
//! value with builder-style setters; [`ActiveOptions`] is the immutable
//! snapshot captured when a connection is established. Mutating the former
//! after connecting never affects a live connection.

use std::time::Duration;

use url::Url;

use crate::error::{Result, TransportError};

/// Underlying stream wrapper a scheme maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    /// Plain TCP stream
    Tcp,
    /// TLS-wrapped TCP stream
    Ssl,
}

impl Wrapper {
    pub fn as_str(&self) -> &'static str {
        match self {
            Wrapper::Tcp => "tcp",
            Wrapper::Ssl => "ssl",
        }
    }
}

/// Fixed scheme table: `http -> tcp:80`, `https -> ssl:443`.
///
/// Unknown schemes are a hard configuration error for the transport.
pub fn scheme_wrapper(scheme: &str) -> Option<(Wrapper, u16)> {
    match scheme {
        "http" => Some((Wrapper::Tcp, 80)),
        "https" => Some((Wrapper::Ssl, 443)),
        _ => None,
    }
}

/// TLS context settings for the socket transport
#[derive(Debug, Clone)]
pub struct TlsOptions {
    /// Verify peer certificates. Off by default to match the observed
    /// behavior of the system this replaces; turn on for production use.
    pub verify_certificates: bool,
    /// Verify that the certificate matches the hostname
    pub verify_hostname: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            verify_certificates: false,
            verify_hostname: false,
        }
    }
}

/// Mutable, pre-connect transport options
#[derive(Debug, Clone)]
pub struct HttpOptions {
    server_url: Option<String>,
    timeout: Duration,
    persist: bool,
    non_blocking: bool,
    tls: TlsOptions,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            server_url: None,
            timeout: Duration::from_secs(20),
            persist: false,
            non_blocking: false,
            tls: TlsOptions::default(),
        }
    }
}

impl HttpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target server URL (`http://host[:port]/...`); mandatory before connect
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Read/connect timeout; fractional seconds allowed
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Advisory persistence flag, carried into the frozen snapshot. Plain
    /// sockets have no OS-level connection reuse, so it changes no transport
    /// behavior.
    pub fn persist(mut self, flag: bool) -> Self {
        self.persist = flag;
        self
    }

    /// Put the socket in non-blocking mode
    pub fn non_blocking(mut self, flag: bool) -> Self {
        self.non_blocking = flag;
        self
    }

    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    pub fn get_server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_persist(&self) -> bool {
        self.persist
    }

    pub fn is_non_blocking(&self) -> bool {
        self.non_blocking
    }

    pub fn get_tls(&self) -> &TlsOptions {
        &self.tls
    }

    /// Capture an immutable snapshot for a new connection.
    ///
    /// Resolves the scheme against the wrapper table and fills in the
    /// default port. Fails on a missing address or unsupported scheme.
    pub fn freeze(&self) -> Result<ActiveOptions> {
        let address = self
            .server_url
            .as_deref()
            .ok_or(TransportError::MissingAddress)?;

        let parsed = Url::parse(address).map_err(|e| TransportError::Connect {
            address: address.to_string(),
            reason: e.to_string(),
            source: Some(Box::new(e)),
        })?;

        let scheme = parsed.scheme();
        let (wrapper, default_port) =
            scheme_wrapper(scheme).ok_or_else(|| TransportError::UnsupportedScheme {
                scheme: scheme.to_string(),
            })?;

        let host = parsed
            .host_str()
            .ok_or_else(|| TransportError::Connect {
                address: address.to_string(),
                reason: "no host in server url".to_string(),
                source: None,
            })?
            .to_string();

        Ok(ActiveOptions {
            address: address.to_string(),
            wrapper,
            host,
            port: parsed.port().unwrap_or(default_port),
            timeout: self.timeout,
            persist: self.persist,
            non_blocking: self.non_blocking,
            tls: self.tls.clone(),
        })
    }
}

/// Immutable options snapshot held by a connected transport.
///
/// Path and query of the original URL are dropped: the transport operates at
/// the byte level and the request line carries the path.
#[derive(Debug, Clone)]
pub struct ActiveOptions {
    address: String,
    wrapper: Wrapper,
    host: String,
    port: u16,
    timeout: Duration,
    persist: bool,
    non_blocking: bool,
    tls: TlsOptions,
}

impl ActiveOptions {
    /// The server URL the connection was built with
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn wrapper(&self) -> Wrapper {
        self.wrapper
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The rewritten wrapper-form address, e.g. `tcp://host:port`
    pub fn wrapper_address(&self) -> String {
        format!("{}://{}:{}", self.wrapper.as_str(), self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_persist(&self) -> bool {
        self.persist
    }

    pub fn is_non_blocking(&self) -> bool {
        self.non_blocking
    }

    pub fn tls(&self) -> &TlsOptions {
        &self.tls
    }
}
