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

use std::time::Duration;

use thiserror::Error;

pub type ProxyResult<T> = Result<T, ProxyError>;

/// Protocol and transfer failures surfaced by the message and transfer layers.
///
/// Every variant aborts the current session only; the listener never sees these.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The byte buffer held no usable HTTP start-line.
    #[error("malformed HTTP header: no start-line present")]
    MalformedHeader,

    /// A chunk-size line was not parseable hexadecimal.
    #[error("invalid chunk size line: {0:?}")]
    ChunkSize(String),

    /// A chunk payload was not followed by CRLF.
    #[error("chunk missing CRLF terminator")]
    ChunkTerminator,

    /// The peer sent nothing within the allowed window.
    ///
    /// The unbounded framing mode swallows this and treats it as end-of-body;
    /// everywhere else it is a hard failure.
    #[error("timed out after {0:?} waiting for peer data")]
    Timeout(Duration),

    /// The peer closed the connection before the declared framing completed.
    #[error("peer closed the connection mid-transfer")]
    ClosedPrematurely,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
