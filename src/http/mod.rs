//! HTTP/1.1 protocol implementation.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`parser`**: Incremental request parser emitting structural events
//! - **`protocol`**: Per-connection state machine driven by those events
//! - **`connection`**: Socket driver running a protocol and its handler tasks
//! - **`request`**: Request representation with lazily parsed views
//! - **`form`**: Query string, form, multipart and cookie decoding
//! - **`response`**: Response representation with builder pattern
//! - **`writer`**: Serializes and writes HTTP responses to the client
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │    Idle     │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request line seen
//!               ▼
//!        ┌─────────────┐
//!        │   Parsing   │ ← Headers accumulating
//!        └──────┬──────┘
//!               │ Headers complete
//!               ▼
//!        ┌──────────────────┐
//!        │ HeadersComplete  │ ← Body streaming
//!        └──────┬───────────┘
//!               │ Message complete
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Handler task running
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │   Responding     │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Idle (same connection)
//!               └─ Close → Closed
//! ```
//!
//! Oversized input, malformed input and idle timeouts move any state
//! straight to `Closed` after a best-effort error response.

pub mod connection;
pub mod form;
pub mod headers;
pub mod parser;
pub mod protocol;
pub mod request;
pub mod response;
pub mod writer;

pub use headers::Headers;
pub use request::{Method, Request, Version};
pub use response::{Response, StatusCode};
