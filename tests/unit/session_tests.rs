/* SIEVE Proxy (AGPL-3.0)

Copyright (C) 2026 - SIEVE Contributors

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.

*/

use std::sync::Arc;
use std::time::Duration;

use sieve_proxy::config::TelemetryConfig;
use sieve_proxy::filtering::FilterSet;
use sieve_proxy::proxy::{ConnectionSession, ProxyServer, SessionShared, Timeouts};
use sieve_proxy::telemetry::EventSink;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const URL_PAGE: &str = "http://landing.example/url-blocked.html";
const CONTENT_PAGE: &str = "http://landing.example/content-blocked.html";

fn shared_with_filters<const N: usize>(filters: [&str; N]) -> SessionShared {
    SessionShared {
        filters: Arc::new(FilterSet::new(filters)),
        sink: EventSink::new(TelemetryConfig::default()),
        force_utf8: true,
        timeouts: Timeouts {
            header: Duration::from_secs(2),
            data: Duration::from_millis(500),
        },
        blocked_url_page: URL_PAGE.to_string(),
        blocked_content_page: CONTENT_PAGE.to_string(),
    }
}

/// Drives one session over an in-memory pipe: writes `request`, lets the
/// session run to completion, and returns everything it wrote back.
async fn exchange(shared: SessionShared, request: &[u8]) -> Vec<u8> {
    let (mut client, proxy_side) = duplex(64 * 1024);
    let session = ConnectionSession::new(1, proxy_side, Arc::new(shared));
    let task = tokio::spawn(session.run());

    client.write_all(request).await.expect("send request");
    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await.expect("read reply");
    task.await.expect("session task");
    reply
}

/// Minimal one-shot origin: accepts a single connection, reads the request
/// header, writes `response` verbatim, and closes.
async fn spawn_origin(response: Vec<u8>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind origin");
    let addr = listener.local_addr().expect("origin addr");
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 2048];
        let _ = stream.read(&mut buf).await.expect("read request");
        stream.write_all(&response).await.expect("write response");
        stream.shutdown().await.expect("close origin");
    });
    addr
}

#[tokio::test]
async fn connect_requests_are_refused_with_405() {
    let reply = exchange(
        shared_with_filters([]),
        b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n",
    )
    .await;

    let text = String::from_utf8_lossy(&reply);
    assert!(text.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
    assert!(text.contains("Unsupported CONNECT request"));
}

#[tokio::test]
async fn filtered_url_redirects_without_contacting_the_origin() {
    let reply = exchange(
        shared_with_filters(["forbidden"]),
        b"GET http://example.com/forbidden.html HTTP/1.1\r\nHost: example.com\r\n\r\n",
    )
    .await;

    let text = String::from_utf8_lossy(&reply);
    assert!(text.starts_with("HTTP/1.1 302 Found\r\n"));
    assert!(text.contains(&format!("Location: {URL_PAGE}")));
}

#[tokio::test]
async fn empty_request_closes_quietly() {
    let shared = shared_with_filters([]);
    let sink = shared.sink.clone();
    let mut events = sink.subscribe();

    let (client, proxy_side) = duplex(1024);
    let session = ConnectionSession::new(1, proxy_side, Arc::new(shared));
    let task = tokio::spawn(session.run());
    drop(client);
    task.await.expect("session task");

    let mut saw_empty = false;
    while let Ok(event) = events.try_recv() {
        if event.message.contains("empty request") {
            saw_empty = true;
        }
    }
    assert!(saw_empty);
}

#[tokio::test]
async fn filtered_text_response_becomes_a_redirect() {
    let body = "<html>a gremlin lives here</html>";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let origin = spawn_origin(response.into_bytes()).await;

    let request = format!("GET /page.html HTTP/1.1\r\nHost: {origin}\r\n\r\n");
    let reply = exchange(shared_with_filters(["gremlin"]), request.as_bytes()).await;

    let text = String::from_utf8_lossy(&reply);
    assert!(text.starts_with("HTTP/1.1 302 Found\r\n"));
    assert!(text.contains(&format!("Location: {CONTENT_PAGE}")));
    assert!(!text.contains("gremlin"));
}

#[tokio::test]
async fn clean_text_response_is_forwarded_with_its_body() {
    let body = "<html>nothing to see</html>";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let origin = spawn_origin(response.into_bytes()).await;

    let request = format!("GET /page.html HTTP/1.1\r\nHost: {origin}\r\n\r\n");
    let reply = exchange(shared_with_filters(["gremlin"]), request.as_bytes()).await;

    let text = String::from_utf8_lossy(&reply);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with(body));
}

#[tokio::test]
async fn binary_response_streams_through_even_when_it_matches_a_filter() {
    // Filter words inside non-text bodies are never inspected.
    let body = b"PNGgremlinPNG";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    let mut wire = response.into_bytes();
    wire.extend_from_slice(body);
    let origin = spawn_origin(wire).await;

    let request = format!("GET /logo.png HTTP/1.1\r\nHost: {origin}\r\n\r\n");
    let reply = exchange(shared_with_filters(["gremlin"]), request.as_bytes()).await;

    let text = String::from_utf8_lossy(&reply);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(reply.ends_with(body));
}

#[tokio::test]
async fn chunked_text_response_is_forwarded_byte_exact() {
    let chunked = "4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nTransfer-Encoding: chunked\r\n\r\n{chunked}"
    );
    let origin = spawn_origin(response.into_bytes()).await;

    let request = format!("GET /page.html HTTP/1.1\r\nHost: {origin}\r\n\r\n");
    let reply = exchange(shared_with_filters(["gremlin"]), request.as_bytes()).await;

    let text = String::from_utf8_lossy(&reply);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with(chunked));
}

#[tokio::test]
async fn chunked_filtering_matches_the_payload_not_the_framing() {
    // "grem" and "lin" sit in separate chunks; only the de-chunked payload
    // contains the filter word.
    let chunked = "4\r\ngrem\r\n3\r\nlin\r\n0\r\n\r\n";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nTransfer-Encoding: chunked\r\n\r\n{chunked}"
    );
    let origin = spawn_origin(response.into_bytes()).await;

    let request = format!("GET /page.html HTTP/1.1\r\nHost: {origin}\r\n\r\n");
    let reply = exchange(shared_with_filters(["gremlin"]), request.as_bytes()).await;

    let text = String::from_utf8_lossy(&reply);
    assert!(text.starts_with("HTTP/1.1 302 Found\r\n"));
}

#[tokio::test]
async fn post_bodies_are_relayed_to_the_origin() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind origin");
    let addr = listener.local_addr().expect("origin addr");
    let origin = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut seen = Vec::new();
        let mut buf = [0u8; 1024];
        // Request header plus an 11-byte body; read until the body arrived.
        loop {
            let n = stream.read(&mut buf).await.expect("read");
            seen.extend_from_slice(&buf[..n]);
            if seen.ends_with(b"hello=world") {
                break;
            }
        }
        stream
            .write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")
            .await
            .expect("respond");
        stream.shutdown().await.expect("close");
        seen
    });

    let request = format!(
        "POST /submit HTTP/1.1\r\nHost: {addr}\r\nContent-Length: 11\r\n\r\nhello=world"
    );
    let reply = exchange(shared_with_filters([]), request.as_bytes()).await;

    let seen = origin.await.expect("origin task");
    let seen_text = String::from_utf8_lossy(&seen);
    assert!(seen_text.starts_with("POST /submit HTTP/1.1\r\n"));
    assert!(seen_text.contains("Proxy-Connection: close"));
    assert!(seen_text.ends_with("hello=world"));

    let text = String::from_utf8_lossy(&reply);
    assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
}

#[tokio::test]
async fn requests_are_rewritten_to_origin_form_before_forwarding() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind origin");
    let addr = listener.local_addr().expect("origin addr");
    let origin = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 2048];
        let n = stream.read(&mut buf).await.expect("read");
        let seen = buf[..n].to_vec();
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await
            .expect("respond");
        stream.shutdown().await.expect("close");
        seen
    });

    let host = format!("127.0.0.1:{}", addr.port());
    let request =
        format!("GET http://127.0.0.1/page.html HTTP/1.1\r\nHost: {host}\r\nAccept-Encoding: gzip\r\n\r\n");
    let _reply = exchange(shared_with_filters([]), request.as_bytes()).await;

    let seen = origin.await.expect("origin task");
    let seen_text = String::from_utf8_lossy(&seen);
    assert!(seen_text.starts_with("GET /page.html HTTP/1.1\r\n"));
    assert!(seen_text.contains("Connection: close"));
    assert!(seen_text.contains("Accept-Encoding: utf-8"));
}

#[tokio::test]
async fn server_accepts_real_connections_and_stop_only_halts_the_listener() {
    let server = ProxyServer::new("127.0.0.1", 0, shared_with_filters([]));
    let handle = server.start().await.expect("start");

    let mut client = TcpStream::connect(handle.local_addr()).await.expect("dial proxy");
    client
        .write_all(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
        .await
        .expect("send");

    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await.expect("read");
    let text = String::from_utf8_lossy(&reply);
    assert!(text.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));

    handle.stop();
    handle.wait_for_sessions().await;
}
