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

//! Body relay between two byte streams under one of three framing modes.
//!
//! The relay never buffers more than a fixed-size window unless the caller
//! explicitly asks for accumulation via [`receive`], so bodies of unknown size
//! stream through with bounded memory. Chunked framing is forwarded
//! byte-exact: size lines, payloads, and chunk terminators are relayed
//! verbatim so the downstream peer sees the identical byte sequence.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use super::message::HttpMessage;
use crate::utils::{ProxyError, ProxyResult};

/// Relay window for fixed-length and unbounded copies.
const COPY_BUF_SIZE: usize = 8192;

/// Body framing declared by a message's headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `Content-Length: N`; read until exactly N bytes have been consumed.
    Length(u64),
    /// `Transfer-Encoding: chunked`; length-prefixed chunks, zero terminates.
    Chunked,
    /// No usable length and not chunked; read until close or idle timeout.
    /// The framing of last resort, valid for response bodies only.
    UntilClose,
}

impl Framing {
    /// Framing for a response body. Chunked wins over Content-Length; a
    /// missing or non-numeric Content-Length falls back to read-until-close.
    pub fn of_response(header: &HttpMessage) -> Framing {
        if is_chunked(header) {
            return Framing::Chunked;
        }
        match declared_length(header) {
            Some(len) => Framing::Length(len),
            None => Framing::UntilClose,
        }
    }

    /// Framing for a request body, or `None` when the request declares no
    /// body at all (no length, not chunked). Until-close is never valid on
    /// the request path: the client closing would end the whole exchange.
    pub fn of_request(header: &HttpMessage) -> Option<Framing> {
        if is_chunked(header) {
            return Some(Framing::Chunked);
        }
        declared_length(header).filter(|len| *len > 0).map(Framing::Length)
    }
}

fn is_chunked(header: &HttpMessage) -> bool {
    header
        .get("Transfer-Encoding")
        .map(|value| value.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false)
}

fn declared_length(header: &HttpMessage) -> Option<u64> {
    header
        .get("Content-Length")
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// Reads a start-line + header block from the stream, scanning byte by byte
/// until CRLFCRLF, bounded by `window`.
///
/// Returns an empty buffer when the peer closes before sending anything (the
/// caller treats that as a quiet end of connection); closing mid-header is an
/// error, as is silence past the window.
pub async fn read_header<R>(src: &mut R, window: Duration) -> ProxyResult<BytesMut>
where
    R: AsyncRead + Unpin,
{
    const CRLFCRLF: u32 = 0x0D0A_0D0A;

    let mut buf = BytesMut::new();
    let mut last4: u32 = 0;
    let mut byte = [0u8; 1];

    loop {
        let n = read_some(src, &mut byte, window).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(buf);
            }
            return Err(ProxyError::ClosedPrematurely);
        }
        last4 = (last4 << 8) | byte[0] as u32;
        buf.extend_from_slice(&byte);
        if last4 == CRLFCRLF {
            return Ok(buf);
        }
    }
}

/// Relays a body from `src` to `dst` under the given framing, forwarding each
/// chunk of bytes as it arrives. Returns the number of bytes written to `dst`
/// (payload plus chunked framing overhead).
///
/// Any transport error or timeout mid-relay aborts the transfer; bytes already
/// forwarded are not retracted, so the sink may have seen a truncated body.
/// For [`Framing::UntilClose`] an idle timeout is the normal end-of-body
/// signal and yields `Ok`.
pub async fn relay<R, W>(src: &mut R, dst: &mut W, framing: Framing, idle: Duration) -> ProxyResult<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let total = match framing {
        Framing::Length(len) => copy_exact(src, dst, len, idle).await?,
        Framing::Chunked => relay_chunked(src, dst, idle).await?,
        Framing::UntilClose => relay_until_close(src, dst, idle).await?,
    };
    dst.flush().await?;
    Ok(total)
}

/// Accumulates a body into memory instead of forwarding it, for the
/// buffered-and-filtered response path. Same framing rules as [`relay`].
pub async fn receive<R>(src: &mut R, framing: Framing, idle: Duration) -> ProxyResult<BytesMut>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    relay(src, &mut buf, framing, idle).await?;
    Ok(BytesMut::from(buf.as_slice()))
}

/// Decodes an in-memory chunked-encoded body into its payload bytes.
///
/// Trailer lines after the terminal chunk are ignored.
pub fn decode_chunked(raw: &[u8]) -> ProxyResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0;

    loop {
        let line_end = raw[pos..]
            .iter()
            .position(|b| *b == b'\n')
            .ok_or(ProxyError::ClosedPrematurely)?
            + pos;
        let size = parse_chunk_size(&raw[pos..=line_end])?;
        pos = line_end + 1;

        if size == 0 {
            return Ok(out);
        }
        // A declared size the buffer cannot possibly hold is the same failure
        // as a truncated buffer, without the arithmetic overflowing.
        let end = usize::try_from(size)
            .ok()
            .and_then(|size| pos.checked_add(size))
            .and_then(|end| end.checked_add(2))
            .ok_or(ProxyError::ClosedPrematurely)?;
        if end > raw.len() {
            return Err(ProxyError::ClosedPrematurely);
        }
        let size = size as usize;
        out.extend_from_slice(&raw[pos..pos + size]);
        pos += size;
        if &raw[pos..pos + 2] != b"\r\n" {
            return Err(ProxyError::ChunkTerminator);
        }
        pos += 2;
    }
}

/// Copies exactly `len` bytes, looping over however many partial reads the
/// transport delivers. A zero-length read before the count is reached means
/// the peer closed mid-body.
async fn copy_exact<R, W>(src: &mut R, dst: &mut W, len: u64, idle: Duration) -> ProxyResult<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; COPY_BUF_SIZE];
    let mut total: u64 = 0;

    while total < len {
        let want = (len - total).min(buf.len() as u64) as usize;
        let n = read_some(src, &mut buf[..want], idle).await?;
        if n == 0 {
            return Err(ProxyError::ClosedPrematurely);
        }
        dst.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    Ok(total)
}

/// Relays a chunked body byte-exact: each size line, payload, and trailing
/// CRLF is forwarded verbatim. A chunk-size of zero ends the body; trailer
/// lines (usually just the final CRLF) are forwarded unvalidated.
async fn relay_chunked<R, W>(src: &mut R, dst: &mut W, idle: Duration) -> ProxyResult<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total: u64 = 0;

    loop {
        let size_line = read_line(src, idle).await?;
        dst.write_all(&size_line).await?;
        total += size_line.len() as u64;

        let size = parse_chunk_size(&size_line)?;
        if size == 0 {
            // Trailer lines are optional: the origin may close right after
            // the zero chunk, and that still counts as a complete body.
            loop {
                let Some(trailer) = read_trailer_line(src, idle).await? else {
                    return Ok(total);
                };
                dst.write_all(&trailer).await?;
                total += trailer.len() as u64;
                if trailer == b"\r\n" || trailer == b"\n" {
                    break;
                }
            }
            return Ok(total);
        }

        total += copy_exact(src, dst, size, idle).await?;

        let mut crlf = [0u8; 2];
        read_full(src, &mut crlf, idle).await?;
        if &crlf != b"\r\n" {
            return Err(ProxyError::ChunkTerminator);
        }
        dst.write_all(&crlf).await?;
        total += 2;
    }
}

/// Relays until the source closes or goes idle past the timeout. Both are
/// normal termination for a body with no declared length.
async fn relay_until_close<R, W>(src: &mut R, dst: &mut W, idle: Duration) -> ProxyResult<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; COPY_BUF_SIZE];
    let mut total: u64 = 0;

    loop {
        match read_some(src, &mut buf, idle).await {
            Ok(0) => return Ok(total),
            Ok(n) => {
                dst.write_all(&buf[..n]).await?;
                total += n as u64;
            }
            Err(ProxyError::Timeout(_)) => return Ok(total),
            Err(err) => return Err(err),
        }
    }
}

/// Single read bounded by the idle window. `Ok(0)` means the peer closed.
async fn read_some<R>(src: &mut R, buf: &mut [u8], idle: Duration) -> ProxyResult<usize>
where
    R: AsyncRead + Unpin,
{
    match timeout(idle, src.read(buf)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ProxyError::Timeout(idle)),
    }
}

/// Fills `buf` completely or fails with `ClosedPrematurely`.
async fn read_full<R>(src: &mut R, buf: &mut [u8], idle: Duration) -> ProxyResult<()>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = read_some(src, &mut buf[filled..], idle).await?;
        if n == 0 {
            return Err(ProxyError::ClosedPrematurely);
        }
        filled += n;
    }
    Ok(())
}

/// Reads one LF-terminated line, returned with its terminator included so the
/// caller can forward it verbatim.
async fn read_line<R>(src: &mut R, idle: Duration) -> ProxyResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let n = read_some(src, &mut byte, idle).await?;
        if n == 0 {
            return Err(ProxyError::ClosedPrematurely);
        }
        line.push(byte[0]);
        if byte[0] == b'\n' {
            return Ok(line);
        }
    }
}

/// [`read_line`], except end-of-stream is a valid outcome: `None` for a clean
/// close, and a line without its terminator when the peer closed mid-line.
/// Only the trailer section after the terminal chunk is this lenient.
async fn read_trailer_line<R>(src: &mut R, idle: Duration) -> ProxyResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let n = read_some(src, &mut byte, idle).await?;
        if n == 0 {
            if line.is_empty() {
                return Ok(None);
            }
            return Ok(Some(line));
        }
        line.push(byte[0]);
        if byte[0] == b'\n' {
            return Ok(Some(line));
        }
    }
}

/// Parses a chunk-size line: hexadecimal, optional CR before the LF, chunk
/// extensions after `;` discarded.
fn parse_chunk_size(line: &[u8]) -> ProxyResult<u64> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim_end_matches(['\r', '\n']).trim();
    let token = trimmed.split(';').next().unwrap_or(trimmed);
    u64::from_str_radix(token, 16).map_err(|_| ProxyError::ChunkSize(trimmed.to_string()))
}
