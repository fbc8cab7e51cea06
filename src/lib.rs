//! wirecall
//!
//! A synchronous HTTP transport library: a byte-exact HTTP/1.1 engine over
//! plain or TLS sockets, a connection lifecycle contract, and a
//! dual-transport client that falls back from `reqwest` to the socket
//! engine when a payload needs streaming (file uploads).

pub mod client;
pub mod connection;
pub mod error;
pub mod http;
pub mod multipart;
pub mod options;
pub mod retry;
pub mod stream;

// Re-export the surface most callers need
pub use client::{ClientConfig, ClientResponse, FormData, HttpClient};
pub use connection::Connection;
pub use error::{ErrorCategory, Result, TransportError};
pub use http::{Expr, HttpMessage, HttpTransport, WireResponse};
pub use multipart::{MultipartBody, Part};
pub use options::{ActiveOptions, HttpOptions, TlsOptions};
pub use retry::{with_retry, BackoffStrategy, RetryPolicy};
