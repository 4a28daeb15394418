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

use bytes::BytesMut;

use crate::utils::{ProxyError, ProxyResult};

/// Classification of an HTTP/1.x start-line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Get,
    Post,
    Connect,
    Response,
}

/// HTTP protocol version carried on the start-line. Anything that is not
/// explicitly `HTTP/1.0` is treated as 1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    V1_0,
    V1_1,
}

impl HttpVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpVersion::V1_0 => "HTTP/1.0",
            HttpVersion::V1_1 => "HTTP/1.1",
        }
    }
}

impl std::fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed HTTP/1.x message head plus an optional body.
///
/// This is a framing component, not a validator: headers are stored as an
/// ordered list of raw (name, value) pairs exactly as they appeared on the
/// wire, and serializing always reproduces a valid CRLF-terminated header
/// block regardless of how the message was constructed.
///
/// Header access is case-insensitive with first-match-wins semantics: reading
/// returns the first field whose name matches, writing overwrites that field
/// in place (keeping its position) or appends a new one at the end.
#[derive(Debug, Clone)]
pub struct HttpMessage {
    kind: MessageKind,
    version: HttpVersion,
    /// Request target path (GET/POST/CONNECT); empty for responses.
    target: String,
    /// Status code + reason, e.g. "302 Found" (RESPONSE); empty for requests.
    status_line: String,
    fields: Vec<(String, String)>,
    /// Raw body bytes; populated separately from header parsing.
    body: BytesMut,
}

impl HttpMessage {
    /// Builds an empty request message.
    pub fn request(kind: MessageKind, target: impl Into<String>, version: HttpVersion) -> Self {
        Self {
            kind,
            version,
            target: target.into(),
            status_line: String::new(),
            fields: Vec::new(),
            body: BytesMut::new(),
        }
    }

    /// Builds an empty response message from a status line like "200 OK".
    pub fn response(version: HttpVersion, status_line: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Response,
            version,
            target: String::new(),
            status_line: status_line.into(),
            fields: Vec::new(),
            body: BytesMut::new(),
        }
    }

    /// Parses a start-line + header block from raw bytes.
    ///
    /// The buffer is split at the first CRLFCRLF; anything after it is ignored
    /// (bodies travel separately through the transfer engine). The start-line
    /// is classified by scanning for the literal method tokens, defaulting to
    /// a response; the version is 1.0 only when the line carries `HTTP/1.0`.
    pub fn parse(bytes: &[u8]) -> ProxyResult<Self> {
        let text = String::from_utf8_lossy(bytes);
        let header = match text.find("\r\n\r\n") {
            Some(end) => &text[..end],
            None => text.as_ref(),
        };

        let mut lines = header.split("\r\n");
        let start_line = lines
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .ok_or(ProxyError::MalformedHeader)?;

        let kind = if start_line.contains("GET") {
            MessageKind::Get
        } else if start_line.contains("POST") {
            MessageKind::Post
        } else if start_line.contains("CONNECT") {
            MessageKind::Connect
        } else {
            MessageKind::Response
        };

        let version = if start_line.contains("HTTP/1.0") {
            HttpVersion::V1_0
        } else {
            HttpVersion::V1_1
        };

        let mut target = String::new();
        let mut status_line = String::new();
        match kind {
            MessageKind::Get | MessageKind::Post | MessageKind::Connect => {
                target = start_line
                    .split_whitespace()
                    .nth(1)
                    .ok_or(ProxyError::MalformedHeader)?
                    .to_string();
            }
            MessageKind::Response => {
                status_line = start_line.replace(version.as_str(), "").trim().to_string();
            }
        }

        let fields = lines
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        Ok(Self {
            kind,
            version,
            target,
            status_line,
            fields,
            body: BytesMut::new(),
        })
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn set_target(&mut self, target: impl Into<String>) {
        self.target = target.into();
    }

    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Header fields in wire order (first occurrence order is preserved).
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Returns the value of the first header field matching `name`
    /// (case-insensitive), or `None` when the field is absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Sets a header field, overwriting the first case-insensitive match in
    /// place (keeping its position) or appending when absent.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .fields
            .iter_mut()
            .find(|(field, _)| field.eq_ignore_ascii_case(&name))
        {
            Some(field) => *field = (name, value),
            None => self.fields.push((name, value)),
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, bytes: &[u8]) {
        self.body.clear();
        self.body.extend_from_slice(bytes);
    }

    /// Serializes the start-line + header block, CRLFCRLF terminated.
    pub fn header_string(&self) -> String {
        let mut out = String::new();
        match self.kind {
            MessageKind::Get => {
                out.push_str(&format!("GET {} {}\r\n", self.target, self.version));
            }
            MessageKind::Post => {
                out.push_str(&format!("POST {} {}\r\n", self.target, self.version));
            }
            MessageKind::Connect => {
                out.push_str(&format!("CONNECT {} {}\r\n", self.target, self.version));
            }
            MessageKind::Response => {
                out.push_str(&format!("{} {}\r\n", self.version, self.status_line));
            }
        }
        for (name, value) in &self.fields {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str("\r\n");
        out
    }

    pub fn header_bytes(&self) -> Vec<u8> {
        self.header_string().into_bytes()
    }

    /// Serializes the whole frame: header block followed by the body bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.header_bytes();
        out.extend_from_slice(&self.body);
        out
    }

    /// Header block with visible CRLFs, for verbose log output.
    pub fn display_string(&self) -> String {
        self.header_string()
            .replace('\r', "\\r")
            .replace('\n', "\\n\r\n")
    }
}
