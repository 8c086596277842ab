//! Failure taxonomy and classification subsystem.
//!
//! # Data Flow
//! ```text
//! Any failure (pipeline stage, handler, store, socket)
//!     → failure.rs (flatten into a Failure: name, text, status, code, offline)
//!     → classifier.rs (ordered rule table → exactly one ErrorKind)
//!     → messages.rs (user text by operation + kind, recovery hint)
//!     → response.rs (JSON envelope, status, Retry-After)
//! ```
//!
//! # Design Decisions
//! - The taxonomy is closed; `retryable` is a function of the kind alone
//! - Rules are data, evaluated in order, first match wins
//! - Classification happens once, at the HTTP boundary or in the retry loop
//! - Raw messages are logged, never returned, unless authored by the gateway

pub mod classifier;
pub mod failure;
pub mod kind;
pub mod messages;
pub mod response;
pub mod types;

pub use classifier::{ClassificationRule, ClassifiedError, ErrorClassifier, Signal};
pub use failure::{AsFailure, Failure};
pub use kind::{ErrorKind, RetryMode};
pub use messages::{MessageCatalog, RecoveryAction, RecoveryHint};
pub use response::{ApiError, ErrorEnvelope, Operation};
pub use types::{AuthCode, FieldError, GatewayError, GatewayResult};
