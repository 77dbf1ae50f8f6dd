use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ErrorKind, HttpError};
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// Application hook that renders one kind of error.
///
/// The request is `None` when the failure happened before a request could be
/// assembled (malformed request line, oversized headers).
pub type ExceptionHandler =
    Arc<dyn Fn(Option<&Request>, &HttpError) -> Result<Response, HttpError> + Send + Sync>;

/// Translates errors into responses.
///
/// Registered handlers take precedence per [`ErrorKind`]; everything else gets
/// the default rendering.
#[derive(Clone, Default)]
pub struct ErrorHandler {
    handlers: HashMap<ErrorKind, ExceptionHandler>,
    debug: bool,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: ErrorKind, handler: ExceptionHandler) {
        self.handlers.insert(kind, handler);
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn response(&self, request: Option<&Request>, err: &HttpError) -> Result<Response, HttpError> {
        match self.handlers.get(&err.kind()) {
            Some(handler) => handler(request, err),
            None => Ok(self.default_response(err)),
        }
    }

    /// `Error: <message>` with the error's status. Unrecognized errors get a
    /// generic body unless debug mode is on.
    pub fn default_response(&self, err: &HttpError) -> Response {
        let body = match err {
            HttpError::Other(inner) if self.debug => {
                format!("Error: {inner}\nException: {inner:?}")
            }
            HttpError::Other(_) => "An error occurred while generating the request".to_owned(),
            known => format!("Error: {known}"),
        };
        ResponseBuilder::new(err.status()).body(body).build()
    }

    /// Response for a failure raised while rendering another failure.
    pub fn fallback(&self, nested: &HttpError) -> Response {
        let body = if self.debug {
            format!(
                "Error while handling error: {nested}\nStack: {}",
                Backtrace::force_capture()
            )
        } else {
            "An error occurred while handling an error".to_owned()
        };
        ResponseBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
            .body(body)
            .build()
    }
}
