//! Connection lifecycle contract shared by every transport
//!
//! The state machine is `Disconnected -> Connected -> (Sending -> Connected)
//! -> Disconnected`. `send` requires an explicit prior `connect`; there is no
//! auto-connect. `receive` is idempotent per request cycle: repeated calls
//! return the cached result until a new `send` invalidates it.

use crate::error::{Result, TransportError};

/// Lifecycle contract for a transport holding at most one active stream.
///
/// `send` is a provided method that enforces the contract before delegating
/// to the transport-specific [`Connection::do_send`]: the expression argument
/// wins over the stored last request, a missing expression fails with
/// `NoExpression`, and an unconnected instance fails with `NotConnected`.
pub trait Connection {
    /// Request expression accepted by this transport
    type Expr;
    /// Prepared server response produced by a send/receive cycle
    type Output;

    /// Materialize the underlying stream from the current options.
    ///
    /// Calling this on an already-connected instance closes the existing
    /// stream first, so a fresh stream is always produced.
    fn connect(&mut self) -> Result<()>;

    /// Whether a live stream handle exists
    fn is_connected(&self) -> bool;

    /// Release the stream and clear cached state; no-op when not connected
    fn close(&mut self);

    /// Queue `expr` as the request to send over the wire
    fn request(&mut self, expr: Self::Expr);

    /// Whether a request expression is queued
    fn has_request(&self) -> bool;

    /// Transport-specific send of the queued expression
    fn do_send(&mut self) -> Result<Self::Output>;

    /// Receive the server response for the last sent request
    fn receive(&mut self) -> Result<Self::Output>;

    /// Send an expression to the server through the transport stream.
    ///
    /// With `None`, the expression last set via [`Connection::request`] is
    /// reused.
    fn send(&mut self, expr: Option<Self::Expr>) -> Result<Self::Output> {
        if let Some(expr) = expr {
            self.request(expr);
        }

        if !self.has_request() {
            return Err(TransportError::NoExpression);
        }

        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.do_send()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-memory transport used to exercise the provided `send`.
    #[derive(Default)]
    struct EchoConnection {
        connected: bool,
        expr: Option<String>,
        sent: Vec<String>,
        cached: Option<String>,
    }

    impl Connection for EchoConnection {
        type Expr = String;
        type Output = String;

        fn connect(&mut self) -> Result<()> {
            if self.connected {
                self.close();
            }
            self.connected = true;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn close(&mut self) {
            self.connected = false;
            self.cached = None;
        }

        fn request(&mut self, expr: String) {
            self.expr = Some(expr);
        }

        fn has_request(&self) -> bool {
            self.expr.is_some()
        }

        fn do_send(&mut self) -> Result<String> {
            let expr = self.expr.clone().ok_or(TransportError::NoExpression)?;
            self.sent.push(expr.clone());
            self.cached = Some(format!("echo: {expr}"));
            Ok(self.cached.clone().unwrap())
        }

        fn receive(&mut self) -> Result<String> {
            self.cached.clone().ok_or(TransportError::NotConnected)
        }
    }

    #[test]
    fn test_send_requires_expression() {
        let mut conn = EchoConnection::default();
        conn.connect().unwrap();

        let err = conn.send(None).unwrap_err();
        assert!(matches!(err, TransportError::NoExpression));
    }

    #[test]
    fn test_send_requires_connect() {
        let mut conn = EchoConnection::default();

        let err = conn.send(Some("ping".into())).unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[test]
    fn test_send_stores_last_request() {
        let mut conn = EchoConnection::default();
        conn.connect().unwrap();

        conn.send(Some("first".into())).unwrap();
        // None reuses the stored expression
        conn.send(None).unwrap();

        assert_eq!(conn.sent, vec!["first".to_string(), "first".to_string()]);
    }

    #[test]
    fn test_explicit_expression_wins_over_queued() {
        let mut conn = EchoConnection::default();
        conn.connect().unwrap();
        conn.request("queued".into());

        let out = conn.send(Some("explicit".into())).unwrap();
        assert_eq!(out, "echo: explicit");
    }
}
