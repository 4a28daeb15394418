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

use anyhow::Result;

use crate::{
    config::SieveConfig,
    filtering::FilterSet,
    proxy::{ProxyServer, SessionShared, Timeouts},
    telemetry::{EventSink, LISTENER_ID},
};

/// Filters applied when the config names neither a filter file nor inline
/// entries.
const DEFAULT_FILTERS: [&str; 4] = ["SpongeBob", "Norrköping", "Paris Hilton", "Britney Spears"];

/// Wires configuration, the filter set, telemetry, and the proxy server
/// together. Keeps main.rs down to parse-init-load-run and gives tests a
/// single constructor that accepts an arbitrary config.
///
/// Initialization order: telemetry first so filter loading can log through
/// it, then filters, then the server that consumes both.
pub struct SieveApp {
    server: ProxyServer,
}

impl SieveApp {
    pub fn new(config: SieveConfig) -> Result<Self> {
        let sink = EventSink::new(config.telemetry);

        let filters = Arc::new(load_filters(&config, &sink));
        sink.info(
            format!("Loaded {} filter entries.", filters.len()),
            LISTENER_ID,
        );

        let shared = SessionShared {
            filters,
            sink,
            force_utf8: config.proxy.force_utf8,
            timeouts: Timeouts {
                header: Duration::from_secs(config.proxy.header_timeout_secs),
                data: Duration::from_secs(config.proxy.data_timeout_secs),
            },
            blocked_url_page: config.proxy.blocked_url_page,
            blocked_content_page: config.proxy.blocked_content_page,
        };

        let server = ProxyServer::new(
            config.listener.bind_address,
            config.listener.bind_port,
            shared,
        );

        Ok(Self { server })
    }

    /// Binds the listener and accepts connections until the process exits.
    pub async fn run(self) -> Result<()> {
        self.server.run().await
    }
}

/// Resolves the filter set: file if configured (falling back with a warning
/// when it cannot be read), else inline entries, else the built-in defaults.
pub fn load_filters(config: &SieveConfig, sink: &EventSink) -> FilterSet {
    if let Some(path) = &config.filters.path {
        match FilterSet::from_file(path) {
            Ok(filters) => return filters,
            Err(err) => {
                sink.warning(
                    format!("Falling back to default filters: {err:#}."),
                    LISTENER_ID,
                );
                return FilterSet::new(DEFAULT_FILTERS);
            }
        }
    }
    if !config.filters.entries.is_empty() {
        return FilterSet::new(config.filters.entries.clone());
    }
    FilterSet::new(DEFAULT_FILTERS)
}
