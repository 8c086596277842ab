//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Internal call to an external service / store:
//!     → policy.rs (resolve RetryPolicy by operation class)
//!     → retries.rs (invoke, classify failure, decide)
//!     → backoff.rs (exponential delay + optional jitter)
//!     → cancel.rs (stop between attempts when the caller goes away)
//! ```
//!
//! # Design Decisions
//! - Policies are chosen by operation class name, never per call site
//! - Only kinds the classifier marks retryable are retried
//! - Backoff is an async sleep; no lock is held across it

pub mod backoff;
pub mod cancel;
pub mod policy;
pub mod retries;

pub use cancel::{CancelOnDrop, CancelToken};
pub use policy::{PolicyTable, RetryPolicy};
pub use retries::{RetryError, RetryOrchestrator};
