//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → sanitize.rs (strip script constructs from query and JSON body)
//!     → rate_limit.rs (general tier, then the route's own tier)
//!     → Pass to authentication
//! ```
//!
//! # Design Decisions
//! - Limiter state is constructed explicitly and injected, never global
//! - Rejections are absorbed here and never reach the handler
//! - No trust in client input, including `X-Forwarded-For` unless configured

pub mod rate_limit;
pub mod sanitize;

pub use rate_limit::{rate_limit, Decision, RateLimiter, RateLimiters, Tier, TierGuard};
pub use sanitize::{clean_str, clean_value, sanitize_request, Sanitizer};
