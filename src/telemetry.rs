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

use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::{TelemetryConfig, TelemetryMode};

/// Connection id used for events that belong to the listener rather than a session.
pub const LISTENER_ID: u64 = 0;

/// Severity of a [`LogEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
    Warning,
    Verbose,
}

/// One structured log record emitted by the proxy core.
///
/// `connection_id` is assigned by the listener at accept time (sessions count
/// from 1, the listener itself uses [`LISTENER_ID`]).
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub message: String,
    pub connection_id: u64,
    pub level: LogLevel,
}

/// Fan-out sink for session log events.
///
/// Every event is mirrored into `tracing` (or printed as JSON, depending on the
/// configured mode) and broadcast to any number of subscribers. Delivery is
/// fire-and-forget: a subscriber that falls behind loses old events instead of
/// blocking the session that emitted them.
#[derive(Clone)]
pub struct EventSink {
    mode: TelemetryMode,
    tx: broadcast::Sender<LogEvent>,
}

impl EventSink {
    pub fn new(cfg: TelemetryConfig) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { mode: cfg.mode, tx }
    }

    /// Registers a new observer. Subscribers only see events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, level: LogLevel, message: impl Into<String>, connection_id: u64) {
        let event = LogEvent {
            message: message.into(),
            connection_id,
            level,
        };

        match self.mode {
            TelemetryMode::Stdout => match event.level {
                LogLevel::Info => tracing::info!(connection_id, "{}", event.message),
                LogLevel::Error => tracing::error!(connection_id, "{}", event.message),
                LogLevel::Warning => tracing::warn!(connection_id, "{}", event.message),
                LogLevel::Verbose => tracing::debug!(connection_id, "{}", event.message),
            },
            TelemetryMode::Json => {
                if let Ok(data) = serde_json::to_string(&event) {
                    println!("{}", data);
                }
            }
        }

        // send only fails when there are no subscribers, which is fine
        let _ = self.tx.send(event);
    }

    pub fn info(&self, message: impl Into<String>, connection_id: u64) {
        self.emit(LogLevel::Info, message, connection_id);
    }

    pub fn error(&self, message: impl Into<String>, connection_id: u64) {
        self.emit(LogLevel::Error, message, connection_id);
    }

    pub fn warning(&self, message: impl Into<String>, connection_id: u64) {
        self.emit(LogLevel::Warning, message, connection_id);
    }

    pub fn verbose(&self, message: impl Into<String>, connection_id: u64) {
        self.emit(LogLevel::Verbose, message, connection_id);
    }
}
