//! Retry orchestration behind real routes, against a store that fails on demand.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use tokio::time::Instant;

use harvest_gateway::resilience::RetryPolicy;
use harvest_gateway::store::{Document, ListQuery, MemoryStore, ResourceKind, ResourceStore, StoreError};

use common::*;

/// Delegates to a [`MemoryStore`] after failing the first `failures` lookups.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    failures: u32,
    error: StoreError,
    lookups: AtomicU32,
}

impl FlakyStore {
    fn new(inner: Arc<MemoryStore>, failures: u32, error: StoreError) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures,
            error,
            lookups: AtomicU32::new(0),
        })
    }

    fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceStore for FlakyStore {
    async fn find_by_id(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        if self.lookups.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(self.error.clone());
        }
        self.inner.find_by_id(kind, id).await
    }

    async fn list(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
    ) -> Result<Vec<Document>, StoreError> {
        self.inner.list(kind, query).await
    }

    async fn insert(&self, kind: ResourceKind, document: Document) -> Result<Document, StoreError> {
        self.inner.insert(kind, document).await
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        self.inner.update(kind, id, patch).await
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<bool, StoreError> {
        self.inner.delete(kind, id).await
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("connection reset".into())
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let store = seeded_store();
    let flaky = FlakyStore::new(store.clone(), 2, unavailable());
    let app = app_with_store(test_config(), flaky.clone(), store);

    let reply = call(Method::GET, format!("/api/farms/{ALICE_FARM}"))
        .send(&app.router)
        .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["name"], "North field");
    assert_eq!(flaky.lookups(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_surface_classified_error() {
    let mut config = test_config();
    config
        .retry_policies
        .insert("data-fetch".into(), RetryPolicy::new(2, 1_000, 10_000, 2.0, false));

    let store = seeded_store();
    let flaky = FlakyStore::new(store.clone(), u32::MAX, unavailable());
    let app = app_with_store(config, flaky.clone(), store);

    let start = Instant::now();
    let reply = call(Method::GET, format!("/api/farms/{ALICE_FARM}"))
        .send(&app.router)
        .await;

    assert_eq!(flaky.lookups(), 2);
    assert!(start.elapsed().as_millis() >= 1_000);
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
    assert_eq!(reply.kind(), "NETWORK");
    assert_eq!(reply.body["error"]["retryable"], true);
    // Raw store detail stays in the logs
    assert!(!reply.body.to_string().contains("connection reset"));
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_failure_runs_once() {
    let store = seeded_store();
    let flaky = FlakyStore::new(store.clone(), 1, StoreError::Duplicate("farm name".into()));
    let app = app_with_store(test_config(), flaky.clone(), store);

    let reply = call(Method::GET, format!("/api/farms/{ALICE_FARM}"))
        .send(&app.router)
        .await;

    assert_eq!(flaky.lookups(), 1);
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.kind(), "CONFLICT");
}

#[tokio::test(start_paused = true)]
async fn test_ownership_lookup_is_not_retried_by_handler() {
    let store = seeded_store();
    let flaky = FlakyStore::new(store.clone(), 1, unavailable());
    let app = app_with_store(test_config(), flaky.clone(), store);

    // The ownership guard loads the farm once; a store failure there is final
    let reply = call(Method::PUT, format!("/api/farms/{ALICE_FARM}"))
        .token(token_for(&app.config, ALICE))
        .json(serde_json::json!({ "name": "Renamed" }))
        .send(&app.router)
        .await;

    assert_eq!(flaky.lookups(), 1);
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
}

#[tokio::test(start_paused = true)]
async fn test_reloaded_policy_applies_to_next_request() {
    let store = seeded_store();
    let flaky = FlakyStore::new(store.clone(), u32::MAX, unavailable());
    let app = app_with_store(test_config(), flaky.clone(), store);

    let mut reloaded = app.config.clone();
    reloaded
        .retry_policies
        .insert("data-fetch".into(), RetryPolicy::single_attempt());
    harvest_gateway::HttpServer::apply_config(app.server.limiters(), app.server.retries(), &reloaded);

    call(Method::GET, format!("/api/farms/{ALICE_FARM}"))
        .send(&app.router)
        .await;
    assert_eq!(flaky.lookups(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_uses_error_envelope() {
    let mut config = test_config();
    config.timeouts.request_secs = 1;
    config
        .retry_policies
        .insert("data-fetch".into(), RetryPolicy::new(3, 5_000, 10_000, 2.0, false));

    let store = seeded_store();
    let flaky = FlakyStore::new(store.clone(), u32::MAX, unavailable());
    let app = app_with_store(config, flaky.clone(), store);

    let reply = call(Method::GET, format!("/api/farms/{ALICE_FARM}"))
        .send(&app.router)
        .await;

    // Cut off while waiting out the first backoff
    assert_eq!(flaky.lookups(), 1);
    assert_eq!(reply.status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(reply.body["success"], false);
    assert_eq!(reply.kind(), "NETWORK");
    assert_eq!(reply.code(), "ETIMEDOUT");
}
