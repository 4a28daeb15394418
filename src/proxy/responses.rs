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

//! Canned responses the proxy sends on its own behalf: the 302 redirect used
//! for filter hits and the 405 refusal for CONNECT tunneling attempts.

use super::message::{HttpMessage, HttpVersion};

const UNSUPPORTED_BODY: &str = "<html><body><b>Unsupported CONNECT request</b></body></html>\r\n\r\n";

/// Builds a `302 Found` redirect to the given URL.
///
/// Wire format: `HTTP/<version> 302 Found\r\nLocation: <url>\r\n\r\n`.
pub fn redirect_to(version: HttpVersion, url: &str) -> HttpMessage {
    let mut response = HttpMessage::response(version, "302 Found");
    response.set("Location", url);
    response
}

/// Builds the `405 Method Not Allowed` response sent for CONNECT requests.
pub fn unsupported(version: HttpVersion) -> HttpMessage {
    let mut response = HttpMessage::response(version, "405 Method Not Allowed");
    response.set("Content-Type", "text/html");
    response.set("Content-Length", UNSUPPORTED_BODY.len().to_string());
    response.set_body(UNSUPPORTED_BODY.as_bytes());
    response
}
