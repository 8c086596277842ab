//! Harvest API gateway library.
//!
//! Request resilience and access control for the farm management API:
//! input sanitizing, tiered rate limiting, bearer authentication, ownership
//! checks, schema validation, error classification and retry orchestration.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod store;
pub mod validation;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::{Shutdown, ShutdownSignal};
