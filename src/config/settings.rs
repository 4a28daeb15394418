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

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration, loaded from a TOML file. Every section and field
/// has a default so a partial (or empty) file is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SieveConfig {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Rewrite Accept-Encoding so origins send plain utf-8 instead of
    /// compressed bodies the content filter cannot read.
    #[serde(default = "default_true")]
    pub force_utf8: bool,
    #[serde(default = "default_header_timeout_secs")]
    pub header_timeout_secs: u64,
    #[serde(default = "default_data_timeout_secs")]
    pub data_timeout_secs: u64,
    /// Landing page for requests blocked by URL.
    #[serde(default = "default_blocked_url_page")]
    pub blocked_url_page: String,
    /// Landing page for responses blocked by body content.
    #[serde(default = "default_blocked_content_page")]
    pub blocked_content_page: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Optional file with one blocked substring per line. Relative paths are
    /// resolved against the config file's directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Inline filter entries, used when no file is given.
    #[serde(default)]
    pub entries: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub mode: TelemetryMode,
}

/// How session log events leave the process.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryMode {
    /// Human-readable lines through the tracing subscriber.
    #[default]
    Stdout,
    /// One JSON object per event on stdout.
    Json,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            force_utf8: true,
            header_timeout_secs: default_header_timeout_secs(),
            data_timeout_secs: default_data_timeout_secs(),
            blocked_url_page: default_blocked_url_page(),
            blocked_content_page: default_blocked_content_page(),
        }
    }
}

impl SieveConfig {
    /// Loads and validates a config file, anchoring relative paths inside it
    /// to the file's own directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let mut config: SieveConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;

        if let Some(filter_path) = &config.filters.path {
            if filter_path.is_relative() {
                if let Some(base) = path.parent() {
                    config.filters.path = Some(base.join(filter_path));
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.listener.bind_port != 0 && self.listener.bind_port < 1024 {
            bail!(
                "listener.bind_port {} is in the privileged range; use 1024-65535",
                self.listener.bind_port
            );
        }
        if self.proxy.header_timeout_secs == 0 || self.proxy.data_timeout_secs == 0 {
            bail!("proxy timeouts must be at least one second");
        }
        Ok(())
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    5001
}

fn default_true() -> bool {
    true
}

fn default_header_timeout_secs() -> u64 {
    30
}

fn default_data_timeout_secs() -> u64 {
    5
}

fn default_blocked_url_page() -> String {
    "http://www.ida.liu.se/~TDTS04/labs/2011/ass2/error1.html".to_string()
}

fn default_blocked_content_page() -> String {
    "http://www.ida.liu.se/~TDTS04/labs/2011/ass2/error2.html".to_string()
}
