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

use std::path::PathBuf;

use clap::Parser;
use sieve_proxy::{app::SieveApp, config::SieveConfig, utils::init_tracing};

/// Command-line interface definition using clap's derive API.
///
/// Minimal surface area: only the configuration file path and the logging
/// format are exposed. All behavioral config (bind address, filters,
/// timeouts, landing pages) lives in TOML.
#[derive(Debug, Parser)]
#[command(
    name = "sieve",
    about = "SIEVE: substring-filtering intercepting HTTP/1.x proxy"
)]
struct Cli {
    /// Path to the SIEVE configuration file (TOML format).
    ///
    /// Default: config/sieve.example.toml (ships with the repo)
    #[arg(short, long, default_value = "config/sieve.example.toml")]
    config: PathBuf,

    /// Enable JSON-formatted logs (default: human-readable stdout).
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

/// Entry point: parse CLI, initialize logging, load config, run the server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Must happen before any tracing:: calls.
    init_tracing(cli.json_logs);

    let config = SieveConfig::load(&cli.config)?;
    let app = SieveApp::new(config)?;

    // Accepts connections until the process is killed.
    app.run().await
}
