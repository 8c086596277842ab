//! Route handlers.
//!
//! Handlers only see requests that passed the admission pipeline. Every
//! store call runs under the retry orchestrator with the operation class
//! matching its nature.

use std::future::Future;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{MaybePrincipal, OwnedResource, Principal};
use crate::error::{ApiError, AuthCode, GatewayError, GatewayResult};
use crate::http::server::AppState;
use crate::resilience::{CancelToken, RetryError};
use crate::store::{Document, ListQuery, ResourceKind, StoreError};
use crate::validation::ValidatedQuery;

pub const DATA_FETCH: &str = "data-fetch";
pub const DATA_MUTATION: &str = "data-mutation";
pub const FILE_UPLOAD: &str = "file-upload";
pub const AUTH_CALL: &str = "auth";

type HandlerResult = Result<Response, ApiError>;

fn during(operation: &'static str) -> impl FnOnce(GatewayError) -> ApiError {
    move |error| ApiError::new(error).during(operation)
}

/// Run a store call under the policy of `class`.
async fn retried<T, F, Fut>(state: &AppState, class: &str, operation: F) -> GatewayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let cancel = CancelToken::new();
    // Dropping the request future mid-backoff cancels the remaining attempts.
    let _guard = cancel.drop_guard();

    state
        .retries
        .run(class, &cancel, operation)
        .await
        .map_err(|e| match e {
            RetryError::Failed { error, .. } => GatewayError::Store(error),
            RetryError::Cancelled { attempts, .. } => GatewayError::Internal(format!(
                "{class} cancelled after {attempts} attempt(s)"
            )),
        })
}

async fn fetch_one(state: &AppState, kind: ResourceKind, id: &str) -> GatewayResult<Document> {
    let store = state.resources.as_ref();
    retried(state, DATA_FETCH, move || store.find_by_id(kind, id))
        .await?
        .ok_or_else(|| GatewayError::not_found(kind.label(), id))
}

async fn list_page(state: &AppState, kind: ResourceKind, query: ListQuery) -> GatewayResult<Value> {
    let store = state.resources.as_ref();
    let query_ref = &query;
    let items = retried(state, DATA_FETCH, move || store.list(kind, query_ref)).await?;

    let limit = query.limit.max(1);
    Ok(json!({
        "success": true,
        "data": items,
        "count": items.len(),
        "page": query.skip / limit + 1,
        "limit": limit,
    }))
}

async fn insert_owned(
    state: &AppState,
    kind: ResourceKind,
    class: &str,
    mut document: Value,
    owner_field: &str,
    owner: &Principal,
) -> GatewayResult<Document> {
    if let Some(object) = document.as_object_mut() {
        object.insert(owner_field.to_string(), Value::String(owner.id.clone()));
    }
    let store = state.resources.as_ref();
    let created = retried(state, class, move || store.insert(kind, document.clone())).await?;
    tracing::info!(resource = %kind, owner = %owner.id, "Resource created");
    Ok(created)
}

async fn update_owned(state: &AppState, owned: &OwnedResource, patch: Value) -> GatewayResult<Document> {
    let store = state.resources.as_ref();
    let (kind, id) = (owned.kind, owned.id.as_str());
    retried(state, DATA_MUTATION, move || store.update(kind, id, patch.clone()))
        .await?
        // Removed between the ownership check and the write
        .ok_or_else(|| GatewayError::not_found(kind.label(), id))
}

async fn delete_owned(state: &AppState, owned: &OwnedResource) -> GatewayResult<()> {
    let store = state.resources.as_ref();
    let (kind, id) = (owned.kind, owned.id.as_str());
    if retried(state, DATA_MUTATION, move || store.delete(kind, id)).await? {
        tracing::info!(resource = %kind, id, "Resource deleted");
        Ok(())
    } else {
        Err(GatewayError::not_found(kind.label(), id))
    }
}

/// `(skip, limit)` for a validated page query. Saturates instead of overflowing.
fn paging(query: &Value) -> (usize, usize) {
    let page = query["page"].as_u64().unwrap_or(1).max(1);
    let limit = query["limit"].as_u64().unwrap_or(20).max(1);
    let skip = (page - 1).saturating_mul(limit);
    (
        usize::try_from(skip).unwrap_or(usize::MAX),
        usize::try_from(limit).unwrap_or(usize::MAX),
    )
}

fn created(document: Document) -> Response {
    (StatusCode::CREATED, Json(json!({ "success": true, "data": document }))).into_response()
}

fn ok(document: Document) -> Response {
    Json(json!({ "success": true, "data": document })).into_response()
}

pub async fn health() -> Json<Value> {
    Json(json!({ "success": true, "status": "ok" }))
}

pub async fn not_found(uri: axum::http::Uri) -> ApiError {
    ApiError::new(GatewayError::not_found("Route", uri.path()))
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> HandlerResult {
    const OP: &str = "login";

    let identities = state.identities.as_ref();
    let (email, password) = (body.email.as_str(), body.password.as_str());
    let principal = retried(&state, AUTH_CALL, move || {
        identities.verify_credentials(email, password)
    })
    .await
    .map_err(during(OP))?
    .ok_or(GatewayError::Unauthenticated(AuthCode::InvalidCredentials))
    .map_err(during(OP))?;

    if !principal.is_active {
        return Err(ApiError::new(GatewayError::Unauthenticated(AuthCode::AccountInactive)).during(OP));
    }

    let token = state
        .tokens
        .issue(&principal.id)
        .map_err(|e| ApiError::new(GatewayError::Internal(e.to_string())).during(OP))?;

    tracing::info!(user = %principal.id, "User logged in");
    Ok(Json(json!({
        "success": true,
        "token": token,
        "expiresIn": state.tokens.ttl_secs(),
        "user": principal,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Always accepted, so the response does not reveal which emails exist.
pub async fn forgot_password(Json(body): Json<ForgotPasswordRequest>) -> Response {
    tracing::debug!(email = %body.email, "Password reset requested");
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "message": "If that email is registered, a reset link has been sent.",
        })),
    )
        .into_response()
}

pub async fn me(Extension(principal): Extension<Principal>) -> Json<Value> {
    Json(json!({ "success": true, "user": principal }))
}

// ---------------------------------------------------------------------------
// Farms
// ---------------------------------------------------------------------------

pub async fn list_farms(
    State(state): State<AppState>,
    Extension(MaybePrincipal(principal)): Extension<MaybePrincipal>,
    Extension(ValidatedQuery(query)): Extension<ValidatedQuery>,
) -> HandlerResult {
    const OP: &str = "list_farms";

    let mut filter = Vec::new();
    if query["mine"] == Value::Bool(true) {
        let principal = principal
            .ok_or(GatewayError::Unauthenticated(AuthCode::NotAuthenticated))
            .map_err(during(OP))?;
        filter.push(("owner".to_string(), Value::String(principal.id)));
    }

    let (skip, limit) = paging(&query);
    let page = list_page(&state, ResourceKind::Farm, ListQuery { filter, skip, limit })
        .await
        .map_err(during(OP))?;
    Ok(Json(page).into_response())
}

pub async fn get_farm(State(state): State<AppState>, Path(id): Path<String>) -> HandlerResult {
    let farm = fetch_one(&state, ResourceKind::Farm, &id)
        .await
        .map_err(during("load_farm"))?;
    Ok(ok(farm))
}

pub async fn create_farm(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<Value>,
) -> HandlerResult {
    let farm = insert_owned(&state, ResourceKind::Farm, DATA_MUTATION, body, "owner", &principal)
        .await
        .map_err(during("create_farm"))?;
    Ok(created(farm))
}

pub async fn update_farm(
    State(state): State<AppState>,
    Extension(owned): Extension<OwnedResource>,
    Json(patch): Json<Value>,
) -> HandlerResult {
    let farm = update_owned(&state, &owned, patch)
        .await
        .map_err(during("update_farm"))?;
    Ok(ok(farm))
}

/// Deletes the farm and the crops planted on it.
pub async fn delete_farm(
    State(state): State<AppState>,
    Extension(owned): Extension<OwnedResource>,
) -> HandlerResult {
    const OP: &str = "delete_farm";

    delete_owned(&state, &owned).await.map_err(during(OP))?;

    let store = state.resources.as_ref();
    let query = ListQuery {
        filter: vec![("farm".to_string(), Value::String(owned.id.clone()))],
        ..ListQuery::default()
    };
    let query_ref = &query;
    let crops = retried(&state, DATA_FETCH, move || store.list(ResourceKind::Crop, query_ref))
        .await
        .map_err(during(OP))?;
    for crop in &crops {
        if let Some(crop_id) = crop["_id"].as_str() {
            retried(&state, DATA_MUTATION, move || store.delete(ResourceKind::Crop, crop_id))
                .await
                .map_err(during(OP))?;
        }
    }

    Ok(Json(json!({
        "success": true,
        "message": "Farm deleted",
        "cropsRemoved": crops.len(),
    }))
    .into_response())
}

// ---------------------------------------------------------------------------
// Crops
// ---------------------------------------------------------------------------

pub async fn get_crop(State(state): State<AppState>, Path(id): Path<String>) -> HandlerResult {
    let crop = fetch_one(&state, ResourceKind::Crop, &id)
        .await
        .map_err(during("load_crop"))?;
    Ok(ok(crop))
}

/// Crops can only be added to a farm the caller owns.
pub async fn create_crop(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<Value>,
) -> HandlerResult {
    const OP: &str = "create_crop";

    let farm_id = body["farm"].as_str().unwrap_or_default().to_string();
    state
        .ownership
        .authorize(Some(&principal), ResourceKind::Farm, &farm_id)
        .await
        .map_err(during(OP))?;

    let crop = insert_owned(&state, ResourceKind::Crop, DATA_MUTATION, body, "owner", &principal)
        .await
        .map_err(during(OP))?;
    Ok(created(crop))
}

pub async fn update_crop(
    State(state): State<AppState>,
    Extension(owned): Extension<OwnedResource>,
    Json(patch): Json<Value>,
) -> HandlerResult {
    let crop = update_owned(&state, &owned, patch)
        .await
        .map_err(during("update_crop"))?;
    Ok(ok(crop))
}

pub async fn delete_crop(
    State(state): State<AppState>,
    Extension(owned): Extension<OwnedResource>,
) -> HandlerResult {
    delete_owned(&state, &owned)
        .await
        .map_err(during("delete_crop"))?;
    Ok(Json(json!({ "success": true, "message": "Crop deleted" })).into_response())
}

// ---------------------------------------------------------------------------
// Community
// ---------------------------------------------------------------------------

pub async fn list_posts(
    State(state): State<AppState>,
    Extension(ValidatedQuery(query)): Extension<ValidatedQuery>,
) -> HandlerResult {
    let mut filter = Vec::new();
    if let Some(category) = query.get("category").filter(|c| c.is_string()) {
        filter.push(("category".to_string(), category.clone()));
    }

    let (skip, limit) = paging(&query);
    let page = list_page(&state, ResourceKind::Post, ListQuery { filter, skip, limit })
        .await
        .map_err(during("list_posts"))?;
    Ok(Json(page).into_response())
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(mut body): Json<Value>,
) -> HandlerResult {
    if let Some(object) = body.as_object_mut() {
        object.insert("authorName".into(), Value::String(principal.handle.clone()));
        object.insert("likes".into(), json!([]));
        object.insert("comments".into(), json!([]));
    }
    let post = insert_owned(&state, ResourceKind::Post, DATA_MUTATION, body, "author", &principal)
        .await
        .map_err(during("create_post"))?;
    Ok(created(post))
}

pub async fn update_post(
    State(state): State<AppState>,
    Extension(owned): Extension<OwnedResource>,
    Json(patch): Json<Value>,
) -> HandlerResult {
    let post = update_owned(&state, &owned, patch)
        .await
        .map_err(during("update_post"))?;
    Ok(ok(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(owned): Extension<OwnedResource>,
) -> HandlerResult {
    delete_owned(&state, &owned)
        .await
        .map_err(during("delete_post"))?;
    Ok(Json(json!({ "success": true, "message": "Post deleted" })).into_response())
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

/// Record image metadata. The bytes themselves go to external storage.
pub async fn create_upload(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(mut body): Json<Value>,
) -> HandlerResult {
    const OP: &str = "upload_image";

    if let Some(farm_id) = body["farm"].as_str().map(str::to_string) {
        state
            .ownership
            .authorize(Some(&principal), ResourceKind::Farm, &farm_id)
            .await
            .map_err(during(OP))?;
    }
    if let Some(object) = body.as_object_mut() {
        object.insert("status".into(), json!("pending"));
    }

    let upload = insert_owned(&state, ResourceKind::Upload, FILE_UPLOAD, body, "owner", &principal)
        .await
        .map_err(during(OP))?;
    Ok(created(upload))
}
