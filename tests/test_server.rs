//! End-to-end tests over real sockets.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use beacon::config::Config;
use beacon::http::session::SessionLimits;
use beacon::router::{MethodPolicy, Router};
use beacon::server::listener::{ListenEndpoint, Listener};
use beacon::server::pool::WorkerPool;
use beacon::ServerError;
use common::{exchange, parse_response, read_until_close, start_server, wait_idle};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hello() {
    let server = start_server(SessionLimits::default()).await;

    let raw = exchange(server.addr, b"GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    let response = parse_response(&raw);

    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), "hello\n");
    assert_eq!(response.header("Content-Length"), Some("6"));
    assert_eq!(response.header("Connection"), Some("close"));
    wait_idle(&server.tracker).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_headers_echo_in_arrival_order() {
    let server = start_server(SessionLimits::default()).await;

    let raw = exchange(
        server.addr,
        b"GET /headers HTTP/1.1\r\nHost: localhost\r\nX-Second: 2\r\nx-first: 1\r\n\r\n",
    )
    .await;
    let response = parse_response(&raw);

    assert_eq!(response.status, 200);
    let lines: Vec<&str> = response.body_text().split('\n').collect();
    assert_eq!(lines, vec!["Host: localhost", "X-Second: 2", "x-first: 1", ""]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unknown_path() {
    let server = start_server(SessionLimits::default()).await;

    let raw = exchange(server.addr, b"GET /missing HTTP/1.1\r\n\r\n").await;
    let response = parse_response(&raw);

    assert_eq!(response.status, 404);
    assert_eq!(response.body_text(), "Not Found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_wrong_method_on_known_path() {
    let server = start_server(SessionLimits::default()).await;

    let raw = exchange(server.addr, b"POST /hello HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi").await;
    let response = parse_response(&raw);

    assert_eq!(response.status, 405);
    assert_eq!(response.header("Allow"), Some("GET"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unlisted_method_on_known_path() {
    let server = start_server(SessionLimits::default()).await;

    for request in [&b"TRACE /hello HTTP/1.1\r\n\r\n"[..], &b"CONNECT /hello HTTP/1.1\r\n\r\n"[..]] {
        let response = parse_response(&exchange(server.addr, request).await);
        assert_eq!(response.status, 405);
        assert_eq!(response.header("Allow"), Some("GET"));
        assert_eq!(response.body_text(), "Method Not Allowed");
    }
    wait_idle(&server.tracker).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unlisted_method_on_unknown_path() {
    let server = start_server(SessionLimits::default()).await;

    let raw = exchange(server.addr, b"TRACE /nope HTTP/1.1\r\n\r\n").await;
    let response = parse_response(&raw);

    assert_eq!(response.status, 404);
    assert_eq!(response.body_text(), "Not Found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_request_gives_identical_bytes() {
    let server = start_server(SessionLimits::default()).await;
    let request = b"GET /headers HTTP/1.1\r\nHost: localhost\r\nAccept: */*\r\n\r\n";

    let first = exchange(server.addr, request).await;
    let second = exchange(server.addr, request).await;

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connections_do_not_mix() {
    const CLIENTS: usize = 100;
    let server = start_server(SessionLimits::default()).await;

    let mut tasks = Vec::with_capacity(CLIENTS);
    for i in 0..CLIENTS {
        let addr = server.addr;
        tasks.push(tokio::spawn(async move {
            let request = if i % 2 == 0 {
                format!("GET /headers HTTP/1.1\r\nX-Client: {i}\r\n\r\n")
            } else {
                "GET /hello HTTP/1.1\r\n\r\n".to_string()
            };
            (i, exchange(addr, request.as_bytes()).await)
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        let (i, raw) = task.await.unwrap();
        let response = parse_response(&raw);
        assert_eq!(response.status, 200, "client {i}");

        if i % 2 == 0 {
            assert_eq!(response.body_text(), format!("X-Client: {i}\n"));
        } else {
            assert_eq!(response.body_text(), "hello\n");
        }
        seen.insert(i);
    }

    assert_eq!(seen.len(), CLIENTS);
    wait_idle(&server.tracker).await;
    assert_eq!(server.tracker.started(), CLIENTS as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_megabyte_response_is_delivered_in_full() {
    let server = start_server(SessionLimits {
        max_request_bytes: 4 * 1024 * 1024,
        ..SessionLimits::default()
    })
    .await;

    let value = "v".repeat(1000);
    let mut request = String::from("GET /headers HTTP/1.1\r\n");
    let mut expected = String::new();
    for i in 0..1100 {
        request.push_str(&format!("X-Fill-{i}: {value}\r\n"));
        expected.push_str(&format!("X-Fill-{i}: {value}\n"));
    }
    request.push_str("\r\n");
    assert!(expected.len() > 1024 * 1024);

    let raw = exchange(server.addr, request.as_bytes()).await;
    let response = parse_response(&raw);

    assert_eq!(response.status, 200);
    assert_eq!(response.header("Content-Length"), Some(expected.len().to_string().as_str()));
    assert_eq!(response.body.len(), expected.len());
    assert!(response.body_text() == expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_malformed_request_gets_no_response_and_no_leak() {
    let server = start_server(SessionLimits::default()).await;

    let raw = exchange(server.addr, b"garbage\r\n\r\n").await;
    assert!(raw.is_empty());
    wait_idle(&server.tracker).await;

    // The listener keeps serving after a bad session.
    let raw = exchange(server.addr, b"GET /hello HTTP/1.1\r\n\r\n").await;
    assert_eq!(parse_response(&raw).status, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disconnect_mid_request_releases_session() {
    let server = start_server(SessionLimits::default()).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"GET /hel").await.unwrap();
    stream.shutdown().await.unwrap();

    assert!(read_until_close(&mut stream).await.is_empty());
    drop(stream);
    wait_idle(&server.tracker).await;
    assert_eq!(server.tracker.started(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_silent_peer_is_closed_after_read_timeout() {
    let server = start_server(SessionLimits {
        read_timeout: Duration::from_millis(100),
        ..SessionLimits::default()
    })
    .await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let received = tokio::time::timeout(Duration::from_secs(5), read_until_close(&mut stream))
        .await
        .expect("server kept a silent connection open");

    assert!(received.is_empty());
    wait_idle(&server.tracker).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bind_conflict_is_reported() {
    let router = Arc::new(Router::with_default_routes(MethodPolicy::NotAllowed));
    let first = Listener::bind(ListenEndpoint::localhost(0), Arc::clone(&router), SessionLimits::default())
        .await
        .unwrap();
    let taken = ListenEndpoint::localhost(first.local_addr().port());

    let err = Listener::bind(taken, router, SessionLimits::default())
        .await
        .err()
        .expect("second bind on a listening port must fail");
    assert!(matches!(err, ServerError::Bind { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_returns_after_shutdown() {
    let cfg = Config::from_yaml_str("server:\n  port: 0\n").unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        beacon::server::run(&cfg, 2, async {}),
    )
    .await
    .expect("run ignored shutdown")
    .unwrap();
}

#[test]
fn test_sessions_progress_while_caller_thread_is_blocked() {
    use std::io::{Read, Write};

    let pool = WorkerPool::new(2).unwrap();

    pool.block_on(async {
        let router = Arc::new(Router::with_default_routes(MethodPolicy::NotAllowed));
        let listener = Listener::bind(ListenEndpoint::localhost(0), router, SessionLimits::default())
            .await
            .unwrap();
        let addr = listener.local_addr();

        // This future never yields, so the thread driving `serve` is stuck in
        // it; the exchange completes only if accepting happens on the workers.
        let blocking_client = async move {
            let mut stream = std::net::TcpStream::connect(addr).unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            stream.write_all(b"GET /hello HTTP/1.1\r\n\r\n").unwrap();

            let mut received = Vec::new();
            stream.read_to_end(&mut received).expect("no response while caller blocked");
            assert_eq!(parse_response(&received).body_text(), "hello\n");
        };

        beacon::server::serve(listener, pool.threads(), Duration::from_secs(1), blocking_client).await;
    });
}
