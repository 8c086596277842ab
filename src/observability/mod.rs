//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline stages and handlers emit:
//!     → logging.rs (tracing events with tier / operation / kind / code fields)
//!     → metrics.rs (request, rejection, error and retry counters)
//!
//! Consumers:
//!     → stdout, pretty for development or JSON for log shipping
//!     → Prometheus scrape endpoint when enabled
//! ```
//!
//! # Design Decisions
//! - `x-request-id` is generated at the edge and echoed to the client
//! - Raw failure detail only ever reaches the logs, never the response body

pub mod logging;
pub mod metrics;
