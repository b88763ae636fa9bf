#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use beacon::http::session::SessionLimits;
use beacon::router::{MethodPolicy, Router};
use beacon::server::listener::{ListenEndpoint, Listener};
use beacon::server::tracker::SessionTracker;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

pub struct TestServer {
    pub addr: SocketAddr,
    pub tracker: SessionTracker,
    accept_loop: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

/// Starts a listener on an ephemeral localhost port with the default routes.
pub async fn start_server(limits: SessionLimits) -> TestServer {
    let router = Arc::new(Router::with_default_routes(MethodPolicy::NotAllowed));
    let listener = Listener::bind(ListenEndpoint::localhost(0), router, limits)
        .await
        .expect("bind test listener");

    TestServer {
        addr: listener.local_addr(),
        tracker: listener.tracker(),
        accept_loop: tokio::spawn(listener.accept_loop()),
    }
}

/// Reads until the server closes. A reset counts as a close.
pub async fn read_until_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    match stream.read_to_end(&mut received).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {}
        Err(e) => panic!("read failed: {e}"),
    }
    received
}

/// Sends `request` on a fresh connection and returns everything received.
pub async fn exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(request).await.expect("send request");
    tokio::time::timeout(Duration::from_secs(10), read_until_close(&mut stream))
        .await
        .expect("server never closed the connection")
}

pub async fn wait_idle(tracker: &SessionTracker) {
    tokio::time::timeout(Duration::from_secs(5), tracker.wait_idle())
        .await
        .expect("sessions leaked");
}

#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> &str {
        std::str::from_utf8(&self.body).expect("utf-8 body")
    }
}

pub fn parse_response(bytes: &[u8]) -> RawResponse {
    let split = bytes
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response head terminator");
    let head = std::str::from_utf8(&bytes[..split]).expect("utf-8 head");
    let mut lines = head.split("\r\n");

    let status_line = lines.next().expect("status line");
    let mut parts = status_line.splitn(3, ' ');
    assert_eq!(parts.next(), Some("HTTP/1.1"));
    let status = parts.next().expect("status code").parse().expect("numeric status");

    let headers = lines
        .map(|line| {
            let (n, v) = line.split_once(": ").expect("header line");
            (n.to_string(), v.to_string())
        })
        .collect();

    RawResponse {
        status,
        headers,
        body: bytes[split + 4..].to_vec(),
    }
}
