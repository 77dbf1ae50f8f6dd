//! Incremental HTTP/1.x request parser.
//!
//! Bytes are fed as they arrive; each call returns the structural events the
//! new bytes completed. Events never depend on how the input was split, so
//! feeding a request one byte at a time yields the same sequence (body chunks
//! aside) as feeding it whole.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use crate::http::request::{Method, Version};

/// Upper bound on header lines per request.
pub const MAX_HEADERS: usize = 64;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed request head: {0}")]
    InvalidRequest(#[from] httparse::Error),
    #[error("unsupported method {0:?}")]
    InvalidMethod(String),
    #[error("unsupported HTTP version")]
    InvalidVersion,
    #[error("header value is not valid UTF-8")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("invalid chunk size")]
    InvalidChunkSize,
    #[error("chunk data not terminated by CRLF")]
    InvalidChunk,
}

/// Structural events, in the order they occur within one message.
#[derive(Debug, Clone, PartialEq)]
pub enum ParserEvent {
    /// Request target, emitted as soon as the request line has been read.
    Url(String),
    Header { name: String, value: String },
    HeadersComplete {
        method: Method,
        version: Version,
        /// Protocol-level keep-alive for this message.
        keep_alive: bool,
    },
    Body(Bytes),
    MessageComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Head,
    /// Fixed-size body, bytes left.
    Fixed(usize),
    ChunkSize,
    /// Chunk payload, bytes left.
    ChunkData(usize),
    ChunkDataEnd,
    Trailers,
    Done,
}

/// Parser for a single request message.
#[derive(Debug)]
pub struct RequestParser {
    buffer: BytesMut,
    stage: Stage,
    url_seen: bool,
    keep_alive: bool,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            stage: Stage::Head,
            url_seen: false,
            keep_alive: false,
        }
    }

    /// Appends `data` and returns every event it completed.
    ///
    /// Parsing stops at the end of the message; extra bytes are kept for
    /// [`take_remaining`](Self::take_remaining).
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<ParserEvent>, ParseError> {
        self.buffer.extend_from_slice(data);

        let mut events = Vec::new();
        loop {
            let progressed = match self.stage {
                Stage::Head => self.parse_head(&mut events)?,
                Stage::Done => false,
                _ => self.parse_body(&mut events)?,
            };
            if !progressed {
                break;
            }
        }
        Ok(events)
    }

    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Keep-alive signal of the parsed head. Meaningful once headers are complete.
    pub fn should_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Bytes received past the end of the current message.
    pub fn take_remaining(&mut self) -> BytesMut {
        std::mem::take(&mut self.buffer)
    }

    fn parse_head(&mut self, events: &mut Vec<ParserEvent>) -> Result<bool, ParseError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let consumed = match req.parse(&self.buffer)? {
            httparse::Status::Partial => {
                // The path is only set once the space after it has been seen.
                if !self.url_seen {
                    if let Some(path) = req.path {
                        self.url_seen = true;
                        events.push(ParserEvent::Url(path.to_owned()));
                    }
                }
                return Ok(false);
            }
            httparse::Status::Complete(consumed) => consumed,
        };

        if !self.url_seen {
            self.url_seen = true;
            events.push(ParserEvent::Url(req.path.unwrap_or("/").to_owned()));
        }

        let method_str = req.method.unwrap_or_default();
        let method = Method::from_str(method_str)
            .ok_or_else(|| ParseError::InvalidMethod(method_str.to_owned()))?;
        let version = match req.version {
            Some(0) => Version::Http10,
            Some(1) => Version::Http11,
            _ => return Err(ParseError::InvalidVersion),
        };

        let mut fields = Vec::with_capacity(req.headers.len());
        for header in req.headers.iter() {
            let value = std::str::from_utf8(header.value)
                .map_err(|_| ParseError::InvalidHeader)?;
            fields.push((header.name.to_owned(), value.trim().to_owned()));
        }

        let body = body_stage(&fields)?;
        let keep_alive = keep_alive(version, &fields);

        self.buffer.advance(consumed);
        self.keep_alive = keep_alive;
        self.stage = body;

        events.extend(
            fields
                .into_iter()
                .map(|(name, value)| ParserEvent::Header { name, value }),
        );
        events.push(ParserEvent::HeadersComplete {
            method,
            version,
            keep_alive,
        });
        Ok(true)
    }

    fn parse_body(&mut self, events: &mut Vec<ParserEvent>) -> Result<bool, ParseError> {
        match self.stage {
            Stage::Fixed(0) => {
                self.stage = Stage::Done;
                events.push(ParserEvent::MessageComplete);
                Ok(true)
            }
            Stage::Fixed(left) => {
                let Some(chunk) = self.take_body(left) else {
                    return Ok(false);
                };
                self.stage = Stage::Fixed(left - chunk.len());
                events.push(ParserEvent::Body(chunk));
                Ok(true)
            }
            Stage::ChunkSize => match httparse::parse_chunk_size(&self.buffer) {
                Ok(httparse::Status::Complete((consumed, size))) => {
                    let size =
                        usize::try_from(size).map_err(|_| ParseError::InvalidChunkSize)?;
                    self.buffer.advance(consumed);
                    self.stage = if size == 0 {
                        Stage::Trailers
                    } else {
                        Stage::ChunkData(size)
                    };
                    Ok(true)
                }
                Ok(httparse::Status::Partial) => Ok(false),
                Err(_) => Err(ParseError::InvalidChunkSize),
            },
            Stage::ChunkData(left) => {
                let Some(chunk) = self.take_body(left) else {
                    return Ok(false);
                };
                let left = left - chunk.len();
                self.stage = if left == 0 {
                    Stage::ChunkDataEnd
                } else {
                    Stage::ChunkData(left)
                };
                events.push(ParserEvent::Body(chunk));
                Ok(true)
            }
            Stage::ChunkDataEnd => {
                if self.buffer.len() < 2 {
                    return Ok(false);
                }
                if &self.buffer[..2] != b"\r\n" {
                    return Err(ParseError::InvalidChunk);
                }
                self.buffer.advance(2);
                self.stage = Stage::ChunkSize;
                Ok(true)
            }
            Stage::Trailers => {
                let Some(end) = self.buffer.windows(2).position(|w| w == b"\r\n") else {
                    return Ok(false);
                };
                // Trailer fields are consumed and dropped.
                self.buffer.advance(end + 2);
                if end == 0 {
                    self.stage = Stage::Done;
                    events.push(ParserEvent::MessageComplete);
                }
                Ok(true)
            }
            Stage::Head | Stage::Done => Ok(false),
        }
    }

    fn take_body(&mut self, left: usize) -> Option<Bytes> {
        if self.buffer.is_empty() {
            return None;
        }
        let n = left.min(self.buffer.len());
        Some(self.buffer.split_to(n).freeze())
    }
}

fn body_stage(fields: &[(String, String)]) -> Result<Stage, ParseError> {
    let chunked = fields
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("Transfer-Encoding"))
        .filter_map(|(_, value)| value.rsplit(',').next())
        .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
    if chunked {
        return Ok(Stage::ChunkSize);
    }

    let mut length = None;
    for (_, value) in fields
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("Content-Length"))
    {
        let parsed: usize = value
            .parse()
            .map_err(|_| ParseError::InvalidContentLength)?;
        if length.is_some_and(|l| l != parsed) {
            return Err(ParseError::InvalidContentLength);
        }
        length = Some(parsed);
    }
    Ok(Stage::Fixed(length.unwrap_or(0)))
}

fn keep_alive(version: Version, fields: &[(String, String)]) -> bool {
    let connection = fields
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("Connection"))
        .map(|(_, value)| value.to_ascii_lowercase());
    let has = |token: &str| {
        connection
            .as_deref()
            .is_some_and(|v| v.split(',').any(|t| t.trim() == token))
    };
    match version {
        Version::Http11 => !has("close"),
        Version::Http10 => has("keep-alive"),
    }
}
