//! Socket transport tests against canned local HTTP servers

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;

use wirecall::http::{Expr, HttpMessage, HttpTransport};
use wirecall::stream::{ByteStream, MemoryStream};
use wirecall::{Connection, HttpOptions, TransportError};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Read one request off the socket: header block plus a Content-Length body
/// when one is announced.
fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut request = Vec::new();
    let mut byte = [0u8; 1];
    while !request.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(1) => request.push(byte[0]),
            _ => return request,
        }
    }

    let head = String::from_utf8_lossy(&request).into_owned();
    let body_len = head
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length: "))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = vec![0u8; body_len];
    if body_len > 0 {
        stream.read_exact(&mut body).unwrap();
        request.extend_from_slice(&body);
    }
    request
}

/// Serve exactly one connection: read the request, write `response`, close.
/// Returns the bound URL and a handle resolving to the captured request.
fn serve_once(response: &'static [u8]) -> (String, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        stream.write_all(response).unwrap();
        request
    });

    (url, handle)
}

fn transport_for(url: &str) -> HttpTransport {
    HttpTransport::new(
        HttpOptions::new()
            .server_url(url)
            .timeout(Duration::from_secs(5)),
    )
}

const GET_REQUEST: &str = "GET / HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n";

#[test]
fn test_content_length_body() -> Result<()> {
    init_logging();
    let (url, server) = serve_once(
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 11\r\n\r\nhello world",
    );

    let mut transport = transport_for(&url);
    transport.connect()?;
    let response = transport.send(Some(GET_REQUEST.into()))?;
    transport.close();
    server.join().unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.header("Content-Type"), Some("text/plain"));
    assert_eq!(response.body_bytes()?, b"hello world");
    Ok(())
}

#[test]
fn test_stream_expression_sent_from_current_position() {
    let (url, server) = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

    // bytes before the read position must never reach the wire
    let mut source = MemoryStream::from_str(&format!("XXXX{GET_REQUEST}"));
    source.seek(4).unwrap();

    let mut transport = transport_for(&url);
    transport.connect().unwrap();
    let response = transport
        .send(Some(Expr::Stream(Box::new(source))))
        .unwrap();
    let seen = server.join().unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(String::from_utf8_lossy(&seen), GET_REQUEST);
}

#[test]
fn test_read_timeout_surfaces_as_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    // accept, then hold the socket open without responding
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);
        thread::sleep(Duration::from_millis(500));
    });

    let mut transport = HttpTransport::new(
        HttpOptions::new()
            .server_url(&url)
            .timeout(Duration::from_millis(100)),
    );
    transport.connect().unwrap();
    let err = transport.send(Some(GET_REQUEST.into())).unwrap_err();
    server.join().unwrap();

    assert!(matches!(err, TransportError::Timeout { .. }));
    // distinguishable from a protocol error: timeouts stay retriable
    assert!(err.is_retriable());
}

#[test]
fn test_chunked_body_kept_verbatim_and_decodable() {
    let (url, server) = serve_once(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
          4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
    );

    let mut transport = transport_for(&url);
    transport.connect().unwrap();
    let response = transport.send(Some(GET_REQUEST.into())).unwrap();
    server.join().unwrap();

    // raw body keeps the chunk framing off the wire
    assert!(response.body_raw().starts_with(b"4\r\nWiki"));
    assert!(response.body_raw().ends_with(b"0\r\n\r\n"));
    // decoded body strips it
    assert_eq!(response.body_bytes().unwrap(), b"Wikipedia");
}

#[test]
fn test_connection_close_body() {
    // neither Content-Length nor chunked: body runs to EOF
    let (url, server) = serve_once(b"HTTP/1.1 200 OK\r\nServer: canned\r\n\r\nuntil the end");

    let mut transport = transport_for(&url);
    transport.connect().unwrap();
    let response = transport.send(Some(GET_REQUEST.into())).unwrap();
    server.join().unwrap();

    assert_eq!(response.body_bytes().unwrap(), b"until the end");
    // the EOF-terminated read leaves the connection dead
    assert!(!transport.is_connected());
}

#[test]
fn test_empty_response_is_an_error() {
    let (url, server) = serve_once(b"");

    let mut transport = transport_for(&url);
    transport.connect().unwrap();
    let err = transport.send(Some(GET_REQUEST.into())).unwrap_err();
    server.join().unwrap();

    assert!(matches!(err, TransportError::ServerNotUnderstand));
}

#[test]
fn test_headers_hook_vetoes_body_read() {
    let (url, server) =
        serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");

    let mut transport = transport_for(&url);
    transport.on_headers_received(Box::new(|head| {
        assert_eq!(head.status, 200);
        false
    }));
    transport.connect().unwrap();
    let response = transport
        .send(Some("HEAD / HTTP/1.1\r\nHost: test\r\n\r\n".into()))
        .unwrap();
    server.join().unwrap();

    // headers parsed, body never read
    assert_eq!(response.header("Content-Length"), Some("5"));
    assert!(response.body_raw().is_empty());
}

#[test]
fn test_receive_is_idempotent() {
    let (url, server) =
        serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");

    let mut transport = transport_for(&url);
    transport.connect().unwrap();
    let first = transport.send(Some(GET_REQUEST.into())).unwrap();
    let second = transport.receive().unwrap();
    server.join().unwrap();

    assert_eq!(first.raw_bytes(), second.raw_bytes());
}

#[test]
fn test_message_expression_on_the_wire() {
    let (url, server) =
        serve_once(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n");

    let message = HttpMessage::new("POST", "/things")
        .header("Host", "test")
        .header("Content-Type", "text/plain")
        .header("Content-Length", 7)
        .body_bytes(b"payload".to_vec());

    let mut transport = transport_for(&url);
    transport.connect().unwrap();
    let response = transport.send(Some(Expr::Message(message))).unwrap();
    let seen = server.join().unwrap();
    let seen = String::from_utf8_lossy(&seen);

    assert_eq!(response.status(), 201);
    assert!(seen.starts_with("POST /things HTTP/1.1\r\n"));
    assert!(seen.contains("Content-Type: text/plain\r\n"));
    assert!(seen.ends_with("\r\n\r\npayload"));
}

#[test]
fn test_reconnect_drops_previous_session() {
    let (url, server) =
        serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\na");

    let mut transport = transport_for(&url);
    transport.connect().unwrap();
    let first = transport.send(Some(GET_REQUEST.into())).unwrap();
    server.join().unwrap();
    assert_eq!(first.body_bytes().unwrap(), b"a");

    // reconnect against a fresh server; the cached response must not leak
    let (url2, server2) =
        serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nb");
    transport.set_options(
        HttpOptions::new()
            .server_url(&url2)
            .timeout(Duration::from_secs(5)),
    );
    transport.connect().unwrap();
    let second = transport.send(Some(GET_REQUEST.into())).unwrap();
    server2.join().unwrap();

    assert_eq!(second.body_bytes().unwrap(), b"b");
}

#[test]
fn test_options_frozen_at_connect() {
    let (url, server) =
        serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

    let mut transport = transport_for(&url);
    transport.connect().unwrap();

    // mutating pending options must not affect the live connection
    transport.set_options(HttpOptions::new().server_url("http://127.0.0.1:1"));
    assert_eq!(
        transport.active_options().unwrap().address(),
        url.as_str()
    );

    let response = transport.send(Some(GET_REQUEST.into())).unwrap();
    server.join().unwrap();
    assert_eq!(response.status(), 200);
}

#[test]
fn test_connect_refused_is_connection_error() {
    // bind then drop to get a port that refuses connections
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut transport = transport_for(&url);
    let err = transport.connect().unwrap_err();
    assert!(err.is_retriable());
}
