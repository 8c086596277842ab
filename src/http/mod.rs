//! HTTP surface of the gateway.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request id, trace, timeout, body limit, sanitizer)
//!     → pipeline.rs (per-route limiter, auth, validation, ownership)
//!     → handlers.rs (store calls under the retry orchestrator)
//!     → JSON response or classified error envelope
//! ```

pub mod handlers;
pub mod pipeline;
pub mod schemas;
pub mod server;

pub use pipeline::{AuthMode, Pipeline, RouteSpec};
pub use server::{AppState, HttpServer};
