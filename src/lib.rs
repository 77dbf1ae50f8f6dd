//! Sprint - asynchronous HTTP/1.1 server engine
//!
//! Incremental request parsing, a cached URL router, and a prefork server
//! that dispatches requests to async handlers.

pub mod app;
pub mod config;
pub mod error;
pub mod http;
pub mod router;
pub mod server;

pub use app::App;
pub use config::Config;
pub use error::HttpError;
pub use server::Server;
