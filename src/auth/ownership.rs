//! Ownership authorization for mutating routes.
//!
//! Ownership is single-owner and exact-match for every resource kind, so one
//! algorithm runs over a registry of `kind -> loader`. Checks run in a fixed
//! order: no principal (AUTH), resource absent (NOT_FOUND), owner mismatch
//! (AUTHORIZATION).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{RawPathParams, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use thiserror::Error;

use crate::auth::principal::Principal;
use crate::error::{ApiError, AuthCode, GatewayError, GatewayResult};
use crate::store::{Document, ResourceKind, ResourceStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a loader for {0} is already registered")]
    Duplicate(ResourceKind),
}

/// Loads one kind of resource and names the field holding its owner.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<Document>, StoreError>;

    fn owner_field(&self) -> &'static str;
}

/// [`ResourceLoader`] over a [`ResourceStore`] collection.
pub struct StoreLoader {
    store: Arc<dyn ResourceStore>,
    kind: ResourceKind,
    owner_field: &'static str,
}

impl StoreLoader {
    pub fn new(store: Arc<dyn ResourceStore>, kind: ResourceKind, owner_field: &'static str) -> Self {
        Self {
            store,
            kind,
            owner_field,
        }
    }
}

#[async_trait]
impl ResourceLoader for StoreLoader {
    async fn load(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.store.find_by_id(self.kind, id).await
    }

    fn owner_field(&self) -> &'static str {
        self.owner_field
    }
}

/// A resource the current principal has been confirmed to own.
#[derive(Debug, Clone)]
pub struct OwnedResource {
    pub kind: ResourceKind,
    pub id: String,
    pub document: Document,
}

/// Owner id from a stored reference: a bare id, a populated `{_id|id}` object
/// or an extended-JSON `{"$oid": ..}`.
pub fn owner_id(value: &Value) -> Option<&str> {
    match value {
        Value::String(id) => Some(id),
        Value::Object(map) => ["_id", "id", "$oid"]
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(owner_id),
        _ => None,
    }
}

#[derive(Default)]
pub struct OwnershipAuthorizer {
    loaders: HashMap<ResourceKind, Arc<dyn ResourceLoader>>,
}

impl OwnershipAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard owner fields for every store-backed kind.
    pub fn for_store(store: Arc<dyn ResourceStore>) -> Result<Self, RegistryError> {
        let mut authorizer = Self::new();
        for (kind, field) in [
            (ResourceKind::Farm, "owner"),
            (ResourceKind::Crop, "owner"),
            (ResourceKind::Post, "author"),
            (ResourceKind::Upload, "owner"),
        ] {
            authorizer.register(kind, Arc::new(StoreLoader::new(store.clone(), kind, field)))?;
        }
        Ok(authorizer)
    }

    pub fn register(
        &mut self,
        kind: ResourceKind,
        loader: Arc<dyn ResourceLoader>,
    ) -> Result<(), RegistryError> {
        if self.loaders.contains_key(&kind) {
            return Err(RegistryError::Duplicate(kind));
        }
        self.loaders.insert(kind, loader);
        Ok(())
    }

    pub fn is_registered(&self, kind: ResourceKind) -> bool {
        self.loaders.contains_key(&kind)
    }

    pub async fn authorize(
        &self,
        principal: Option<&Principal>,
        kind: ResourceKind,
        id: &str,
    ) -> GatewayResult<OwnedResource> {
        let principal =
            principal.ok_or(GatewayError::Unauthenticated(AuthCode::NotAuthenticated))?;

        let loader = self
            .loaders
            .get(&kind)
            .ok_or_else(|| GatewayError::Internal(format!("no loader registered for {kind}")))?;

        let document = loader
            .load(id)
            .await?
            .ok_or_else(|| GatewayError::not_found(kind.label(), id))?;

        let owner = document.get(loader.owner_field()).and_then(owner_id);
        if owner != Some(principal.id.as_str()) {
            tracing::warn!(
                principal = %principal.id,
                resource = %kind,
                id,
                "Ownership check failed"
            );
            return Err(GatewayError::Forbidden {
                resource: kind.as_str().to_string(),
            });
        }

        Ok(OwnedResource {
            kind,
            id: id.to_string(),
            document,
        })
    }
}

/// Middleware state: which kind the route's `{id}` refers to.
#[derive(Clone)]
pub struct OwnershipGuard {
    pub authorizer: Arc<OwnershipAuthorizer>,
    pub kind: ResourceKind,
}

/// Confirm the principal owns the resource named by the `id` path parameter.
pub async fn require_owner(
    State(guard): State<OwnershipGuard>,
    params: RawPathParams,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(id) = params
        .iter()
        .find(|(name, _)| *name == "id")
        .map(|(_, value)| value.to_string())
    else {
        let err = GatewayError::Internal(format!("{} route has no id parameter", guard.kind));
        return ApiError::for_request(err, &req).into_response();
    };

    let result = guard
        .authorizer
        .authorize(req.extensions().get::<Principal>(), guard.kind, &id)
        .await;

    match result {
        Ok(owned) => {
            req.extensions_mut().insert(owned);
            next.run(req).await
        }
        Err(err) => ApiError::for_request(err, &req).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn principal(id: &str) -> Principal {
        Principal {
            id: id.into(),
            email: format!("{id}@farm.test"),
            handle: id.into(),
            is_active: true,
        }
    }

    fn setup() -> OwnershipAuthorizer {
        let store = Arc::new(MemoryStore::new());
        store
            .put(ResourceKind::Farm, json!({ "_id": "f1", "owner": "alice" }))
            .unwrap();
        store
            .put(
                ResourceKind::Post,
                json!({ "_id": "p1", "author": { "_id": "bob", "username": "bob" } }),
            )
            .unwrap();
        OwnershipAuthorizer::for_store(store).unwrap()
    }

    #[test]
    fn test_owner_id_shapes() {
        assert_eq!(owner_id(&json!("u1")), Some("u1"));
        assert_eq!(owner_id(&json!({ "_id": "u1", "email": "x" })), Some("u1"));
        assert_eq!(owner_id(&json!({ "id": "u2" })), Some("u2"));
        assert_eq!(owner_id(&json!({ "_id": { "$oid": "u3" } })), Some("u3"));
        assert_eq!(owner_id(&json!(42)), None);
    }

    #[tokio::test]
    async fn test_precedence() {
        let authorizer = setup();
        let alice = principal("alice");

        let err = authorizer
            .authorize(None, ResourceKind::Farm, "missing")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Unauthenticated(AuthCode::NotAuthenticated)
        ));

        let err = authorizer
            .authorize(Some(&alice), ResourceKind::Farm, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));

        let err = authorizer
            .authorize(Some(&principal("mallory")), ResourceKind::Farm, "f1")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Forbidden { .. }));

        let owned = authorizer
            .authorize(Some(&alice), ResourceKind::Farm, "f1")
            .await
            .unwrap();
        assert_eq!(owned.document["owner"], "alice");
    }

    #[tokio::test]
    async fn test_nested_author() {
        let authorizer = setup();
        assert!(authorizer
            .authorize(Some(&principal("bob")), ResourceKind::Post, "p1")
            .await
            .is_ok());
        // Same id under another kind is not the post
        assert!(matches!(
            authorizer
                .authorize(Some(&principal("bob")), ResourceKind::Farm, "p1")
                .await,
            Err(GatewayError::NotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_registration() {
        let store: Arc<dyn ResourceStore> = Arc::new(MemoryStore::new());
        let mut authorizer = OwnershipAuthorizer::for_store(store.clone()).unwrap();
        let loader = Arc::new(StoreLoader::new(store, ResourceKind::Farm, "owner"));
        assert_eq!(
            authorizer.register(ResourceKind::Farm, loader),
            Err(RegistryError::Duplicate(ResourceKind::Farm))
        );
    }
}
