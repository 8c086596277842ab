//! Request payload validation.
//!
//! # Data Flow
//! ```text
//! Route-level schema + source (body / query / path)
//!     → schema.rs (one pass, every error collected, unknown fields dropped)
//!     → middleware.rs (request rewritten with the cleaned value)
//!     → object_id.rs (path ids checked before any store lookup)
//! ```

pub mod middleware;
pub mod object_id;
pub mod schema;

pub use middleware::{
    require_object_ids, validate_request, ValidatedPath, ValidatedQuery, ValidationGuard,
};
pub use object_id::{check_path_ids, is_object_id};
pub use schema::{FieldSpec, FieldType, Schema, Source};
