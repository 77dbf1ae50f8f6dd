//! Per-connection protocol state machine.
//!
//! [`HttpProtocol`] owns everything about one connection except the socket:
//! request accumulation, size limits, idle-deadline bookkeeping and the
//! keep-alive decision. Input arrives either as raw bytes
//! ([`data_received`](HttpProtocol::data_received)) or as already-parsed
//! [`ParserEvent`]s ([`handle_event`](HttpProtocol::handle_event)); output is
//! a [`ResponseWriter`] holding the frame to send. The socket-facing driver
//! lives in [`connection`](crate::http::connection).

use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, error};

use crate::app::ErrorHandler;
use crate::config::Config;
use crate::error::HttpError;
use crate::http::headers::Headers;
use crate::http::parser::{ParserEvent, RequestParser};
use crate::http::request::{Request, Version};
use crate::http::response::Response;
use crate::http::writer::{ResponseWriter, serialize_response};
use crate::server::signal::Signal;

/// Where a connection is in its request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted (or kept alive), waiting for the next request.
    Idle,
    /// The request line has been seen.
    Parsing,
    /// A [`Request`] exists; the body may still be streaming.
    HeadersComplete,
    /// The message is complete and a handler owns the request.
    Dispatching,
    /// A response frame is being produced.
    Responding,
    Closed,
}

/// Limits applied to every connection of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolSettings {
    pub request_timeout: Duration,
    /// `None` disables the size limit.
    pub request_max_size: Option<usize>,
}

impl ProtocolSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            request_max_size: config.request_max_size,
        }
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct HttpProtocol {
    state: ConnectionState,
    settings: ProtocolSettings,
    signal: Signal,
    peer: Option<SocketAddr>,

    parser: Option<RequestParser>,
    url: Option<String>,
    headers: Headers,
    request: Option<Request>,
    in_flight: Option<Arc<Request>>,
    version: Option<Version>,
    keep_alive: bool,

    total_request_size: usize,
    /// Clock reading (ms) of connection setup or of the last response.
    last_request_time: u64,
    /// Bytes that arrived after the end of the in-flight message.
    pending: BytesMut,
}

impl HttpProtocol {
    pub fn new(settings: ProtocolSettings, signal: Signal, peer: Option<SocketAddr>) -> Self {
        Self {
            state: ConnectionState::Idle,
            settings,
            signal,
            peer,
            parser: None,
            url: None,
            headers: Headers::new(),
            request: None,
            in_flight: None,
            version: None,
            keep_alive: false,
            total_request_size: 0,
            last_request_time: 0,
            pending: BytesMut::new(),
        }
    }

    /// Starts the idle deadline.
    pub fn connection_made(&mut self, now: u64) {
        self.last_request_time = now;
        self.state = ConnectionState::Idle;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while no byte of a new request has been received.
    pub fn is_idle(&self) -> bool {
        self.state == ConnectionState::Idle && self.parser.is_none()
    }

    /// The request currently owned by a handler, if any.
    pub fn in_flight(&self) -> Option<&Arc<Request>> {
        self.in_flight.as_ref()
    }

    /// Time left before the idle deadline; `None` once it has passed.
    pub fn time_left(&self, now: u64) -> Option<Duration> {
        let elapsed = Duration::from_millis(now.saturating_sub(self.last_request_time));
        self.settings
            .request_timeout
            .checked_sub(elapsed)
            .filter(|left| !left.is_zero())
    }

    /// Feeds raw bytes. Returns the request to dispatch when a message completes.
    pub fn data_received(&mut self, data: &[u8]) -> Result<Option<Arc<Request>>, HttpError> {
        match self.state {
            ConnectionState::Closed => return Ok(None),
            ConnectionState::Dispatching | ConnectionState::Responding => {
                // No pipelining: hold the bytes until the response is written.
                self.pending.extend_from_slice(data);
                return Ok(None);
            }
            _ => {}
        }

        let parser = self.parser.get_or_insert_with(RequestParser::new);
        let events = parser.feed(data).map_err(|e| {
            debug!(error = %e, "Rejecting malformed request");
            HttpError::invalid_usage("Bad Request")
        })?;

        // Bytes past the end of the message belong to the next one.
        let mut consumed = data.len();
        if parser.is_complete() {
            let rest = parser.take_remaining();
            consumed = consumed.saturating_sub(rest.len());
            self.pending.extend_from_slice(&rest);
        }

        self.total_request_size += consumed;
        if let Some(max) = self.settings.request_max_size {
            if self.total_request_size > max {
                return Err(HttpError::PayloadTooLarge);
            }
        }

        let mut dispatched = None;
        for event in events {
            if let Some(request) = self.handle_event(event)? {
                dispatched = Some(request);
            }
        }
        Ok(dispatched)
    }

    /// Applies one parser event.
    pub fn handle_event(&mut self, event: ParserEvent) -> Result<Option<Arc<Request>>, HttpError> {
        match event {
            ParserEvent::Url(url) => {
                self.url = Some(url);
                self.state = ConnectionState::Parsing;
            }
            ParserEvent::Header { name, value } => {
                if name.eq_ignore_ascii_case("Content-Length") {
                    if let (Some(max), Ok(length)) =
                        (self.settings.request_max_size, value.trim().parse::<usize>())
                    {
                        if length > max {
                            return Err(HttpError::PayloadTooLarge);
                        }
                    }
                }
                self.headers.append(name, value);
            }
            ParserEvent::HeadersComplete {
                method,
                version,
                keep_alive,
            } => {
                if let Some(peer) = self.peer {
                    self.headers.append("Remote-Addr", peer.to_string());
                }
                let url = self
                    .url
                    .take()
                    .ok_or_else(|| HttpError::invalid_usage("Bad Request"))?;
                let headers = mem::take(&mut self.headers);
                self.request = Some(Request::new(&url, headers, version, method));
                self.version = Some(version);
                self.keep_alive = keep_alive;
                self.state = ConnectionState::HeadersComplete;
            }
            ParserEvent::Body(chunk) => {
                let request = self
                    .request
                    .as_mut()
                    .ok_or_else(|| HttpError::invalid_usage("Bad Request"))?;
                request.body.extend_from_slice(&chunk);
            }
            ParserEvent::MessageComplete => {
                let request = self
                    .request
                    .take()
                    .ok_or_else(|| HttpError::invalid_usage("Bad Request"))?;
                if let Some(parser) = self.parser.as_mut() {
                    let rest = parser.take_remaining();
                    self.pending.extend_from_slice(&rest);
                }
                let request = Arc::new(request);
                self.in_flight = Some(Arc::clone(&request));
                self.state = ConnectionState::Dispatching;
                return Ok(Some(request));
            }
        }
        Ok(None)
    }

    /// Serializes the handler's response and decides keep-alive.
    ///
    /// The connection stays open only if the client asked for it and the
    /// worker is not draining. Otherwise the state becomes `Closed` and the
    /// caller must close the transport after writing.
    pub fn write_response(&mut self, response: &Response, now: u64) -> (ResponseWriter, bool) {
        self.state = ConnectionState::Responding;

        let keep_alive = self.keep_alive && !self.signal.is_stopped();
        let version = self.version.unwrap_or(Version::Http11);
        let timeout = self.settings.request_timeout.as_secs();
        let frame = serialize_response(response, version, keep_alive, Some(timeout));

        if keep_alive {
            self.last_request_time = now;
            self.cleanup();
            self.state = ConnectionState::Idle;
        } else {
            self.state = ConnectionState::Closed;
        }
        (ResponseWriter::new(frame), keep_alive)
    }

    /// Builds the error response for a connection-level failure and closes.
    ///
    /// If the translator itself fails, a generic 500 is written instead.
    pub fn write_error(&mut self, err: &HttpError, translator: &ErrorHandler) -> ResponseWriter {
        let request = self.in_flight.as_deref().or(self.request.as_ref());
        let response = match translator.response(request, err) {
            Ok(response) => response,
            Err(nested) => {
                error!(error = %nested, original = %err, "Writing error failed");
                translator.fallback(&nested)
            }
        };

        let version = self.version.unwrap_or(Version::Http11);
        self.state = ConnectionState::Closed;
        ResponseWriter::new(serialize_response(&response, version, false, None))
    }

    /// Picks up bytes that arrived during the previous exchange.
    pub fn resume(&mut self) -> Result<Option<Arc<Request>>, HttpError> {
        if self.state != ConnectionState::Idle || self.pending.is_empty() {
            return Ok(None);
        }
        let pending = mem::take(&mut self.pending);
        self.data_received(&pending)
    }

    /// Closes the connection if it is between requests.
    pub fn close_if_idle(&mut self) -> bool {
        if self.is_idle() {
            self.state = ConnectionState::Closed;
            return true;
        }
        false
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    fn cleanup(&mut self) {
        self.parser = None;
        self.url = None;
        self.headers.clear();
        self.request = None;
        self.in_flight = None;
        self.version = None;
        self.keep_alive = false;
        self.total_request_size = 0;
    }
}
