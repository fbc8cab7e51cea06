//! Error types with categories for classification and retry decisions
//!
//! Every failure surfaced by the transport carries the target address where
//! one is known, and the underlying cause where one exists. Categories drive
//! the retry policy: only connection-level transient failures are retriable,
//! never parse errors or received HTTP statuses.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error categories for classification and retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection establishment or transport-level failures (transient, retriable)
    Connection,
    /// Timeout errors (potentially retriable)
    Timeout,
    /// Protocol-level errors: malformed wire data (never retriable)
    Protocol,
    /// Programmer-usage errors: send before connect, nothing queued
    Usage,
    /// TLS/SSL errors
    Tls,
    /// Internal errors (bugs, unexpected states)
    Internal,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable.
    ///
    /// Corrupt wire data is not a transient condition, so `Protocol` is
    /// excluded; usage errors will fail identically on every attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ErrorCategory::Connection | ErrorCategory::Timeout)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Connection => write!(f, "Connection"),
            ErrorCategory::Timeout => write!(f, "Timeout"),
            ErrorCategory::Protocol => write!(f, "Protocol"),
            ErrorCategory::Usage => write!(f, "Usage"),
            ErrorCategory::Tls => write!(f, "TLS/SSL"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

/// Transport error type covering the whole connect/send/receive cycle
#[derive(Error, Debug)]
pub enum TransportError {
    // Connect errors
    #[error("cannot connect to '{address}': {reason}")]
    Connect {
        address: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("scheme '{scheme}' not supported")]
    UnsupportedScheme { scheme: String },

    #[error("server address is mandatory for connect")]
    MissingAddress,

    // Send errors
    #[error("request call error when sending to server ({address})")]
    SendExpression {
        address: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("expression must be an HTTP message, a byte stream or a string")]
    InvalidExpression,

    // Receive errors
    #[error("server did not respond to request; response headers not received")]
    ServerNotUnderstand,

    #[error("a valid response status line was not found: {line:?}")]
    MalformedStatusLine { line: String },

    #[error("valid header not found: {line:?}")]
    MalformedHeader { line: String },

    #[error("invalid chunk size line: {line:?}")]
    MalformedChunk { line: String },

    // Timeouts
    #[error("operation timed out after {elapsed:?} (limit: {limit:?})")]
    Timeout { elapsed: Duration, limit: Duration },

    // Usage errors
    #[error("connection not connected yet; call connect() before send()")]
    NotConnected,

    #[error("expression not set, nothing to do")]
    NoExpression,

    // Orchestrator
    #[error("redirect limit of {limit} exceeded for '{url}'")]
    RedirectLimit { url: String, limit: u32 },

    // Generic
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            TransportError::Connect { .. } => ErrorCategory::Connection,
            TransportError::UnsupportedScheme { .. } | TransportError::MissingAddress => {
                ErrorCategory::Usage
            }
            TransportError::SendExpression { source, .. } => {
                // the underlying cause decides whether a send failure is transient
                if let Some(inner) = source.downcast_ref::<TransportError>() {
                    inner.category()
                } else {
                    ErrorCategory::Connection
                }
            }
            TransportError::InvalidExpression => ErrorCategory::Usage,
            TransportError::ServerNotUnderstand
            | TransportError::MalformedStatusLine { .. }
            | TransportError::MalformedHeader { .. }
            | TransportError::MalformedChunk { .. } => ErrorCategory::Protocol,
            TransportError::Timeout { .. } => ErrorCategory::Timeout,
            TransportError::NotConnected | TransportError::NoExpression => ErrorCategory::Usage,
            TransportError::RedirectLimit { .. } => ErrorCategory::Protocol,
            TransportError::Tls(_) => ErrorCategory::Tls,
            TransportError::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                    ErrorCategory::Timeout
                }
                std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::NotConnected => ErrorCategory::Connection,
                _ => ErrorCategory::Internal,
            },
        }
    }

    /// Whether this error is retriable
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Wrap an error as a connect failure against `address`
    pub fn connect(
        address: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        TransportError::Connect {
            address: address.into(),
            reason: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap an error as a send failure against `address`
    pub fn send_expression(
        address: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        TransportError::SendExpression {
            address: address.into(),
            source: Box::new(source),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, TransportError>;
