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

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::session::{ConnectionSession, SessionShared};
use crate::telemetry::LISTENER_ID;

/// The accept loop: binds a TCP listener and spawns one detached
/// [`ConnectionSession`] task per accepted client. Sessions are numbered from
/// 1 in accept order; a session that fails never takes the listener down.
pub struct ProxyServer {
    bind_address: String,
    bind_port: u16,
    shared: Arc<SessionShared>,
}

/// Handle to a running [`ProxyServer`].
///
/// [`stop`](ProxyHandle::stop) cancels the accept loop only; sessions already
/// in flight run to completion and can be awaited through
/// [`wait_for_sessions`](ProxyHandle::wait_for_sessions).
pub struct ProxyHandle {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    sessions: TaskTracker,
    accept_task: JoinHandle<()>,
}

impl ProxyServer {
    pub fn new(bind_address: impl Into<String>, bind_port: u16, shared: SessionShared) -> Self {
        Self {
            bind_address: bind_address.into(),
            bind_port,
            shared: Arc::new(shared),
        }
    }

    /// Binds the listener and spawns the accept loop, returning immediately.
    pub async fn start(self) -> Result<ProxyHandle> {
        let addr = format!("{}:{}", self.bind_address, self.bind_port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind listener on {addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("failed to resolve listener address")?;

        let sink = self.shared.sink.clone();
        sink.info(format!("Listening on {local_addr}."), LISTENER_ID);

        let cancel = CancellationToken::new();
        let sessions = TaskTracker::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            self.shared,
            cancel.clone(),
            sessions.clone(),
        ));

        Ok(ProxyHandle {
            local_addr,
            cancel,
            sessions,
            accept_task,
        })
    }

    /// Starts the server and parks until the accept loop exits. Convenience
    /// for the binary entry point, which runs until killed.
    pub async fn run(self) -> Result<()> {
        let handle = self.start().await?;
        handle.wait().await;
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
    sessions: TaskTracker,
) {
    let sink = shared.sink.clone();
    let mut next_id: u64 = 1;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                sink.info("Listener stopping, no longer accepting clients.", LISTENER_ID);
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let id = next_id;
                        next_id += 1;
                        sink.info(format!("Accepted client {peer}."), id);
                        let session = ConnectionSession::new(id, stream, Arc::clone(&shared));
                        sessions.spawn(session.run());
                    }
                    Err(err) => {
                        // Transient accept errors (EMFILE and friends) should
                        // not kill the listener.
                        sink.error(format!("Failed to accept client: {err}."), LISTENER_ID);
                    }
                }
            }
        }
    }

    sessions.close();
}

impl ProxyHandle {
    /// Actual bound address, useful when the configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting new clients. In-flight sessions keep running.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Waits for the accept loop to exit (after [`stop`](Self::stop) or a
    /// listener failure).
    pub async fn wait(self) {
        let _ = self.accept_task.await;
    }

    /// Waits for the accept loop and every in-flight session to finish.
    pub async fn wait_for_sessions(self) {
        let _ = self.accept_task.await;
        self.sessions.wait().await;
    }
}
