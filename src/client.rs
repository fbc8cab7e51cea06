//! Dual-transport HTTP client
//!
//! Sends each logical request through the fastest transport that can express
//! it: a native high-level client (`reqwest`) as the primary, and the socket
//! transport as the fallback for payloads the primary would have to buffer
//! fully in memory (file uploads). Owns the bounded retry policy and
//! redirect following; responses from either path are normalized into the
//! same [`ClientResponse`] shape so callers are transport-agnostic.

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use crate::connection::Connection;
use crate::error::{Result, TransportError};
use crate::http::{Expr, HttpMessage, HttpTransport};
use crate::multipart::{MultipartBody, Part};
use crate::options::{HttpOptions, TlsOptions};
use crate::retry::{with_retry, BackoffStrategy, RetryPolicy};
use crate::stream::MemoryStream;

/// Request payload: ordered form fields, text or file
pub type FormData = Vec<(String, Part)>;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Whole-request timeout on the primary transport
    pub timeout: Duration,
    /// Connect timeout on the primary transport
    pub connect_timeout: Duration,
    /// Maximum attempts against the primary transport, first try included
    pub max_attempts: u32,
    /// Delay between attempts
    pub retry_delay: Duration,
    /// Re-issue the request on 3xx responses
    pub follow_redirects: bool,
    /// Hard cap on redirect depth
    pub max_redirects: u32,
    /// Verify TLS certificates on both transports
    pub verify_tls: bool,
    /// Headers merged into every request unless the caller overrides them
    pub default_headers: Vec<(String, String)>,
    /// Timeout for the socket fallback transport
    pub fallback_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            follow_redirects: true,
            max_redirects: 10,
            verify_tls: false,
            default_headers: Vec::new(),
            fallback_timeout: Duration::from_secs(3),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }
}

/// Normalized response, identical in shape for both transports
#[derive(Debug, Clone)]
pub struct ClientResponse {
    status: u16,
    reason: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl ClientResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Lookup by canonicalized name (`content-type` and `Content-Type` are
    /// the same header here)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&canonicalize_header_name(name))
            .map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as a stream positioned at the start
    pub fn body_stream(&self) -> MemoryStream {
        MemoryStream::from_bytes(self.body.clone())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        self.status / 100 == 3
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Text-only payload the primary transport can carry
enum PrimaryPayload {
    Empty,
    Query(Vec<(String, String)>),
    Form(Vec<(String, String)>),
}

/// Outcome of payload inspection: an expressible encoding, or an explicit
/// signal that the socket fallback must be used. A value, not an error.
enum PayloadPlan {
    Primary(PrimaryPayload),
    NeedsFallback,
}

fn plan_payload(method: &str, data: &[(String, Part)]) -> PayloadPlan {
    let mut pairs = Vec::with_capacity(data.len());
    for (name, part) in data {
        match part {
            Part::Text(value) => pairs.push((name.clone(), value.clone())),
            // the primary transport cannot stream file payloads without
            // buffering them fully
            Part::File { .. } => return PayloadPlan::NeedsFallback,
        }
    }

    if pairs.is_empty() {
        return PayloadPlan::Primary(PrimaryPayload::Empty);
    }

    match method.to_ascii_uppercase().as_str() {
        "GET" | "HEAD" => PayloadPlan::Primary(PrimaryPayload::Query(pairs)),
        _ => PayloadPlan::Primary(PrimaryPayload::Form(pairs)),
    }
}

/// Normalize a header name to `Word-Word` form
fn canonicalize_header_name(name: &str) -> String {
    name.split('-')
        .map(|word| {
            let mut out = String::with_capacity(word.len());
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.extend(chars.flat_map(|c| c.to_lowercase()));
            }
            out
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn resolve_location(base: &str, location: &str) -> Result<String> {
    let base = Url::parse(base).map_err(|e| bad_url(base, e))?;
    let next = base.join(location).map_err(|e| bad_url(location, e))?;
    Ok(next.to_string())
}

fn bad_url(url: &str, e: url::ParseError) -> TransportError {
    TransportError::Connect {
        address: url.to_string(),
        reason: e.to_string(),
        source: Some(Box::new(e)),
    }
}

/// HTTP client orchestrating the primary and fallback transports
pub struct HttpClient {
    config: ClientConfig,
    policy: RetryPolicy,
    primary: reqwest::blocking::Client,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let primary = reqwest::blocking::Client::builder()
            // redirects are followed here, not inside the primary transport
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(!config.verify_tls)
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Io(std::io::Error::other(e)))?;

        let policy = RetryPolicy::new()
            .with_max_attempts(config.max_attempts)
            .with_backoff(BackoffStrategy::fixed(config.retry_delay));

        Ok(Self {
            config,
            policy,
            primary,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn get(&self, url: &str, data: &FormData, headers: &[(String, String)]) -> Result<ClientResponse> {
        self.send("GET", url, data, headers)
    }

    pub fn head(&self, url: &str, data: &FormData, headers: &[(String, String)]) -> Result<ClientResponse> {
        self.send("HEAD", url, data, headers)
    }

    pub fn post(&self, url: &str, data: &FormData, headers: &[(String, String)]) -> Result<ClientResponse> {
        self.send("POST", url, data, headers)
    }

    pub fn delete(&self, url: &str, data: &FormData, headers: &[(String, String)]) -> Result<ClientResponse> {
        self.send("DELETE", url, data, headers)
    }

    /// Send one logical request, choosing the transport per payload shape
    pub fn send(
        &self,
        method: &str,
        url: &str,
        data: &FormData,
        headers: &[(String, String)],
    ) -> Result<ClientResponse> {
        self.send_with_depth(method, url, data, headers, 0)
    }

    fn send_with_depth(
        &self,
        method: &str,
        url: &str,
        data: &FormData,
        headers: &[(String, String)],
        depth: u32,
    ) -> Result<ClientResponse> {
        let merged = self.merge_headers(headers);

        let response = match plan_payload(method, data) {
            PayloadPlan::Primary(payload) => with_retry(&self.policy, || {
                self.primary_attempt(method, url, &payload, &merged)
            })?,
            PayloadPlan::NeedsFallback => {
                tracing::debug!(%url, "payload not expressible on primary transport, using socket fallback");
                self.send_via_socket(method, url, data, &merged)?
            }
        };

        if self.config.follow_redirects && response.is_redirect() {
            if let Some(location) = response.header("Location") {
                if depth >= self.config.max_redirects {
                    return Err(TransportError::RedirectLimit {
                        url: url.to_string(),
                        limit: self.config.max_redirects,
                    });
                }
                let next = resolve_location(url, location)?;
                tracing::debug!(from = %url, to = %next, "following redirect");
                return self.send_with_depth(method, &next, data, headers, depth + 1);
            }
        }

        Ok(response)
    }

    /// Default headers merged under caller headers; caller wins on conflict
    fn merge_headers(&self, caller: &[(String, String)]) -> Vec<(String, String)> {
        let mut merged: Vec<(String, String)> = Vec::new();
        for (name, value) in self.config.default_headers.iter().chain(caller.iter()) {
            let name = canonicalize_header_name(name);
            if let Some(existing) = merged.iter_mut().find(|(n, _)| *n == name) {
                existing.1 = value.clone();
            } else {
                merged.push((name, value.clone()));
            }
        }
        merged
    }

    fn primary_attempt(
        &self,
        method: &str,
        url: &str,
        payload: &PrimaryPayload,
        headers: &[(String, String)],
    ) -> Result<ClientResponse> {
        let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| TransportError::InvalidExpression)?;

        let mut request = self.primary.request(method, url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = match payload {
            PrimaryPayload::Empty => request,
            PrimaryPayload::Query(pairs) => request.query(pairs),
            PrimaryPayload::Form(pairs) => request.form(pairs),
        };

        let response = request.send().map_err(|e| self.map_primary_error(e, url))?;

        let status = response.status().as_u16();
        let reason = response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string();

        let mut header_map = HashMap::new();
        for (name, value) in response.headers() {
            header_map
                .entry(canonicalize_header_name(name.as_str()))
                .or_insert_with(|| String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        let body = response
            .bytes()
            .map_err(|e| self.map_primary_error(e, url))?
            .to_vec();

        Ok(ClientResponse {
            status,
            reason,
            headers: header_map,
            body,
        })
    }

    /// Classify a primary-transport failure for the retry policy: timeouts
    /// and connection errors are transient, everything else is wrapped as a
    /// connect failure against the target.
    fn map_primary_error(&self, e: reqwest::Error, url: &str) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                elapsed: self.config.timeout,
                limit: self.config.timeout,
            }
        } else {
            TransportError::connect(url, e)
        }
    }

    /// Fallback: multipart-encode the payload and send it through the
    /// socket transport against the same URL.
    fn send_via_socket(
        &self,
        method: &str,
        url: &str,
        data: &FormData,
        headers: &[(String, String)],
    ) -> Result<ClientResponse> {
        let parsed = Url::parse(url).map_err(|e| bad_url(url, e))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| TransportError::Connect {
                address: url.to_string(),
                reason: "no host in url".to_string(),
                source: None,
            })?
            .to_string();
        let host_header = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };

        let body = MultipartBody::new(data.to_vec());
        let content_type = body.content_type();
        let content_length = body.content_length()?;

        let mut target = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            target.push('?');
            target.push_str(query);
        }
        if target.is_empty() {
            target.push('/');
        }

        let mut message = HttpMessage::new(method.to_ascii_uppercase(), target);
        for (name, value) in headers {
            message = message.header(name.clone(), value.clone());
        }
        message = message
            .header("Host", host_header)
            .header("Content-Type", content_type)
            .header("Content-Length", content_length)
            .body_reader(Box::new(body.into_reader()));

        let options = HttpOptions::new()
            .server_url(url)
            .timeout(self.config.fallback_timeout)
            .tls(TlsOptions {
                verify_certificates: self.config.verify_tls,
                verify_hostname: self.config.verify_tls,
            });

        let mut transport = HttpTransport::new(options);
        if method.eq_ignore_ascii_case("HEAD") {
            transport.on_headers_received(Box::new(|_| false));
        }

        transport.connect()?;
        let wire = transport.send(Some(Expr::Message(message)))?;
        transport.close();

        let mut header_map = HashMap::new();
        for (name, value) in &wire.head().headers {
            header_map
                .entry(canonicalize_header_name(name))
                .or_insert_with(|| value.clone());
        }

        Ok(ClientResponse {
            status: wire.status(),
            reason: wire.head().reason.clone(),
            headers: header_map,
            body: wire.body_bytes()?,
        })
    }
}
