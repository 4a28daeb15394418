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

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::message::{HttpMessage, MessageKind};
use super::responses;
use super::transfer::{self, Framing};
use crate::filtering::FilterSet;
use crate::telemetry::EventSink;

/// Read windows for one session: a generous one for header blocks, a short
/// idle window for body data (which doubles as the end-of-body signal for
/// bodies with no declared length).
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub header: Duration,
    pub data: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            header: Duration::from_secs(30),
            data: Duration::from_secs(5),
        }
    }
}

/// State shared read-only by every session: the filter set, the event sink,
/// and the policy knobs. Built once by the listener, never mutated after.
pub struct SessionShared {
    pub filters: Arc<FilterSet>,
    pub sink: EventSink,
    pub force_utf8: bool,
    pub timeouts: Timeouts,
    pub blocked_url_page: String,
    pub blocked_content_page: String,
}

/// One accepted client connection, handled end to end: read the request,
/// filter the URL, dial the origin, relay the request, filter or stream the
/// response, close. No keep-alive: every session ends with both sockets
/// closed, and a session never touches another session's sockets or buffers.
///
/// Generic over the client stream so tests can drive a session through an
/// in-memory duplex pipe.
pub struct ConnectionSession<S> {
    id: u64,
    client: S,
    shared: Arc<SessionShared>,
}

impl<S> ConnectionSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(id: u64, client: S, shared: Arc<SessionShared>) -> Self {
        Self { id, client, shared }
    }

    /// Runs the session to completion. Failures are logged through the event
    /// sink and end the session; nothing propagates to the listener.
    pub async fn run(mut self) {
        if let Err(err) = self.handle().await {
            self.shared
                .sink
                .error(format!("session aborted: {err:#}"), self.id);
        }
        // Idempotent: shutting down an already-closed stream is a no-op.
        let _ = self.client.shutdown().await;
    }

    async fn handle(&mut self) -> Result<()> {
        let sink = self.shared.sink.clone();
        let timeouts = self.shared.timeouts;

        // AwaitRequest: read and parse the browser's request header.
        let request_bytes = transfer::read_header(&mut self.client, timeouts.header)
            .await
            .context("failed to receive request header")?;
        if request_bytes.is_empty() {
            sink.info("Got empty request.", self.id);
            return Ok(());
        }

        let mut request =
            HttpMessage::parse(&request_bytes).context("failed to parse request header")?;
        sink.verbose(
            format!("Got request from browser:\r\n{}", request.display_string()),
            self.id,
        );

        // Tunneling is never established.
        if request.kind() == MessageKind::Connect {
            let refusal = responses::unsupported(request.version());
            self.client.write_all(&refusal.to_bytes()).await?;
            sink.info(
                "This proxy doesn't support SSL tunneling via CONNECT.",
                self.id,
            );
            return Ok(());
        }

        // CheckURL: host + path against the filter set, before any dial.
        let url = format!(
            "{}{}",
            request.get("Host").unwrap_or_default(),
            request.target()
        );
        if self.shared.filters.contains(&url) {
            let redirect =
                responses::redirect_to(request.version(), &self.shared.blocked_url_page);
            self.client.write_all(&redirect.to_bytes()).await?;
            sink.info(format!("Filtered url {url}, closing connection."), self.id);
            return Ok(());
        }

        // PrepareRequest: origin-form request line, no reused connections.
        self.prepare_request(&mut request);

        // DialOrigin.
        let Some(host_header) = request.get("Host").map(str::to_owned) else {
            sink.error("Request carries no Host header, aborting.", self.id);
            return Ok(());
        };
        let (host, port) = split_host_port(&host_header);
        sink.info(format!("Connecting to remote server: {host}:{port}."), self.id);
        let mut origin = match TcpStream::connect((host.as_str(), port)).await {
            Ok(stream) => stream,
            Err(err) => {
                sink.error(
                    format!("Failed to connect to remote server {host}:{port}: {err}."),
                    self.id,
                );
                return Ok(());
            }
        };
        sink.info("Connected to remote server.", self.id);

        // RelayRequest: header, then the body for POST under its own framing.
        sink.verbose(
            format!(
                "Sending request to remote server:\r\n{}",
                request.display_string()
            ),
            self.id,
        );
        origin
            .write_all(&request.header_bytes())
            .await
            .context("failed to send request header to remote server")?;

        if request.kind() == MessageKind::Post {
            match Framing::of_request(&request) {
                Some(framing) => {
                    sink.info("Sending POST data.", self.id);
                    transfer::relay(&mut self.client, &mut origin, framing, timeouts.data)
                        .await
                        .context("failed to relay POST body to remote server")?;
                    sink.info("POST data successfully sent.", self.id);
                }
                // No declared length and not chunked means zero body.
                None => {}
            }
        }

        // AwaitResponse.
        let response_bytes = transfer::read_header(&mut origin, timeouts.header)
            .await
            .context("failed to receive response header from remote server")?;
        if response_bytes.is_empty() {
            sink.info("Failed to receive header from remote server.", self.id);
            return Ok(());
        }

        let response =
            HttpMessage::parse(&response_bytes).context("failed to parse response header")?;
        sink.verbose(
            format!(
                "Header received from remote server:\r\n{}",
                response.display_string()
            ),
            self.id,
        );

        self.forward_response(&mut origin, &response).await?;

        sink.info("Closing client connection.", self.id);
        sink.info("Closing server connection.", self.id);
        Ok(())
    }

    /// DecideBodyPath + BufferAndFilter/StreamThrough: textual human-readable
    /// bodies are buffered and checked against the filter set; everything else
    /// streams straight through without buffering.
    async fn forward_response(
        &mut self,
        origin: &mut TcpStream,
        response: &HttpMessage,
    ) -> Result<()> {
        let sink = self.shared.sink.clone();
        let timeouts = self.shared.timeouts;
        let framing = Framing::of_response(response);

        let content_type = response.get("Content-Type").unwrap_or_default();
        let is_text = content_type.contains("text/html") || content_type.contains("text/plain");
        let is_human_readable = match response.get("Content-Encoding") {
            None => true,
            Some(encoding) => encoding == "utf-8",
        };

        if is_text && is_human_readable {
            sink.info(
                format!("Content check stage: received text file ({content_type})."),
                self.id,
            );

            let raw = transfer::receive(origin, framing, timeouts.data)
                .await
                .context("failed to receive response body")?;

            // Filter over the payload, not the chunked framing around it.
            let text = match framing {
                Framing::Chunked => match transfer::decode_chunked(&raw) {
                    Ok(payload) => String::from_utf8_lossy(&payload).into_owned(),
                    Err(_) => String::from_utf8_lossy(&raw).into_owned(),
                },
                _ => String::from_utf8_lossy(&raw).into_owned(),
            };

            if self.shared.filters.contains(&text) {
                sink.info("Filter stage: filtered text file. Redirecting.", self.id);
                let redirect =
                    responses::redirect_to(response.version(), &self.shared.blocked_content_page);
                self.client.write_all(&redirect.to_bytes()).await?;
            } else {
                sink.info("Filter stage: OK text file. Forwarding.", self.id);
                self.client.write_all(&response.header_bytes()).await?;
                self.client.write_all(&raw).await?;
                self.client.flush().await?;
            }
        } else {
            sink.info("Content check stage: non text file. Forwarding.", self.id);
            self.client.write_all(&response.header_bytes()).await?;
            transfer::relay(origin, &mut self.client, framing, timeouts.data)
                .await
                .context("failed to stream response body to client")?;
            sink.info("Forwarding complete.", self.id);
        }
        Ok(())
    }

    /// Rewrites the request the way the origin expects it from a direct
    /// client: strip the absolute-URL prefix browsers add when talking to a
    /// proxy, force the connection closed after one exchange, and optionally
    /// ask for utf-8 so the body stays filterable.
    fn prepare_request(&self, request: &mut HttpMessage) {
        if let Some(host) = request.get("Host") {
            let hostname = host.split(':').next().unwrap_or(host).to_owned();
            let origin_form = request
                .target()
                .replace(&format!("http://{hostname}"), "");
            request.set_target(origin_form);
        }

        if request.version() == super::message::HttpVersion::V1_1 {
            request.set("Connection", "close");
        }
        request.set("Proxy-Connection", "close");

        if self.shared.force_utf8 {
            // Disables gzip/deflate so the response stays filterable text.
            request.set("Accept-Encoding", "utf-8");
        }
    }
}

/// Splits a `host[:port]` header value, defaulting to port 80.
fn split_host_port(host: &str) -> (String, u16) {
    match host.split_once(':') {
        Some((name, port)) => (
            name.to_string(),
            port.parse().unwrap_or(80),
        ),
        None => (host.to_string(), 80),
    }
}
