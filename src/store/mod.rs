//! External collaborator contracts.
//!
//! The document store and the identity store are consumed as black boxes:
//! "load resource by kind and id → document or nothing" and "load principal by
//! id → principal or nothing". [`memory::MemoryStore`] backs both for local
//! runs and tests.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::auth::principal::Principal;

pub use memory::MemoryStore;

/// A stored document (JSON object with an `_id`).
pub type Document = Value;

/// Resource collections reachable through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Farm,
    Crop,
    Post,
    Upload,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Farm,
        ResourceKind::Crop,
        ResourceKind::Post,
        ResourceKind::Upload,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Farm => "farm",
            ResourceKind::Crop => "crop",
            ResourceKind::Post => "post",
            ResourceKind::Upload => "upload",
        }
    }

    /// Display name used in client messages.
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Farm => "Farm",
            ResourceKind::Crop => "Crop",
            ResourceKind::Post => "Post",
            ResourceKind::Upload => "Upload",
        }
    }

    /// Collection name in seed files.
    pub fn collection(self) -> &'static str {
        match self {
            ResourceKind::Farm => "farms",
            ResourceKind::Crop => "crops",
            ResourceKind::Post => "posts",
            ResourceKind::Upload => "uploads",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by store implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out: {0}")]
    Timeout(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("store error: {0}")]
    Backend(String),
}

/// Paging and equality filter for list queries.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Top-level field equality constraints.
    pub filter: Vec<(String, Value)>,
    pub skip: usize,
    pub limit: usize,
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn find_by_id(&self, kind: ResourceKind, id: &str)
        -> Result<Option<Document>, StoreError>;

    async fn list(&self, kind: ResourceKind, query: &ListQuery)
        -> Result<Vec<Document>, StoreError>;

    /// Insert a new document; the store assigns `_id` and `createdAt`.
    async fn insert(&self, kind: ResourceKind, document: Document)
        -> Result<Document, StoreError>;

    /// Shallow-merge `patch` into the document. `None` if it does not exist.
    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        patch: Document,
    ) -> Result<Option<Document>, StoreError>;

    /// `false` if the document did not exist.
    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_principal(&self, id: &str) -> Result<Option<Principal>, StoreError>;

    /// Principal owning these credentials, if they match.
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Principal>, StoreError>;
}
