use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::request::Version;
use crate::http::response::Response;

/// Headers owned by the framing logic; explicit values are never written.
const FRAMING_HEADERS: [&str; 4] = [
    "Content-Type",
    "Content-Length",
    "Connection",
    "Transfer-Encoding",
];

/// Serializes a response into a complete HTTP/1.x frame.
///
/// `Keep-Alive: timeout=<n>` is only written when the connection stays open
/// and a non-zero timeout is configured.
pub fn serialize_response(
    resp: &Response,
    version: Version,
    keep_alive: bool,
    keep_alive_timeout: Option<u64>,
) -> BytesMut {
    let mut buf = BytesMut::with_capacity(256 + resp.body.len());

    // Status line and framing headers
    let head = format!(
        "HTTP/{} {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: {}\r\n",
        version.as_str(),
        resp.status.as_u16(),
        resp.status.reason_phrase(),
        resp.content_type,
        resp.body.len(),
        if keep_alive { "keep-alive" } else { "close" },
    );
    buf.extend_from_slice(head.as_bytes());

    if let Some(timeout) = keep_alive_timeout.filter(|t| keep_alive && *t > 0) {
        buf.extend_from_slice(format!("Keep-Alive: timeout={timeout}\r\n").as_bytes());
    }

    for (k, v) in resp.headers.iter() {
        if FRAMING_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(k)) {
            continue;
        }
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    // Body
    buf.extend_from_slice(&resp.body);

    buf
}

/// A serialized frame and how much of it has reached the socket.
pub struct ResponseWriter {
    buffer: Bytes,
    written: usize,
}

impl ResponseWriter {
    pub fn new(frame: impl Into<Bytes>) -> Self {
        Self {
            buffer: frame.into(),
            written: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
