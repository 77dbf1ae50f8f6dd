//! Error taxonomy shared by the router, the connection layer and the
//! application dispatch path.
//!
//! Every variant of [`HttpError`] carries a default HTTP status. Errors raised
//! while reading a request (bad input, size limits, timeouts) are turned into
//! a response directly by the connection; errors raised by route lookup or by
//! a handler go through the application's
//! [`ErrorHandler`](crate::app::ErrorHandler) first.

use thiserror::Error;

use crate::http::request::Method;
use crate::http::response::StatusCode;

/// Discriminant of [`HttpError`], used to key application error handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidUsage,
    MethodNotAllowed,
    NotFound,
    RequestTimeout,
    PayloadTooLarge,
    ServerError,
    /// Anything outside the taxonomy.
    Other,
}

/// Failures that end up as an HTTP error response.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Malformed input: bad JSON, bad request line or headers.
    #[error("{0}")]
    InvalidUsage(String),

    /// The 405 flavour of invalid usage: the URL matched a route but the
    /// route does not accept this method.
    #[error("Method {method} not allowed for URL {url}")]
    MethodNotAllowed { method: Method, url: String },

    #[error("{0}")]
    NotFound(String),

    #[error("Request Timeout")]
    RequestTimeout,

    #[error("Payload Too Large")]
    PayloadTooLarge,

    #[error("{0}")]
    ServerError(String),

    /// Unrecognized failure raised by application code.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HttpError {
    pub fn invalid_usage(message: impl Into<String>) -> Self {
        HttpError::InvalidUsage(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HttpError::NotFound(message.into())
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        HttpError::ServerError(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HttpError::InvalidUsage(_) => ErrorKind::InvalidUsage,
            HttpError::MethodNotAllowed { .. } => ErrorKind::MethodNotAllowed,
            HttpError::NotFound(_) => ErrorKind::NotFound,
            HttpError::RequestTimeout => ErrorKind::RequestTimeout,
            HttpError::PayloadTooLarge => ErrorKind::PayloadTooLarge,
            HttpError::ServerError(_) => ErrorKind::ServerError,
            HttpError::Other(_) => ErrorKind::Other,
        }
    }

    /// Default HTTP status for this error.
    ///
    /// # Example
    ///
    /// ```
    /// # use sprint::error::HttpError;
    /// assert_eq!(HttpError::PayloadTooLarge.status().as_u16(), 413);
    /// assert_eq!(HttpError::not_found("gone").status().as_u16(), 404);
    /// ```
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::InvalidUsage(_) => StatusCode::BAD_REQUEST,
            HttpError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            HttpError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            HttpError::ServerError(_) | HttpError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
