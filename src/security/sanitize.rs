//! Script-injection stripping for request payloads.
//!
//! String leaves of JSON bodies and query parameters are cleaned of script
//! blocks, `javascript:` URIs and inline `on*=` handler assignments. Cleaning
//! repeats until nothing matches, so the output is stable under re-application.

use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, uri::PathAndQuery, HeaderMap, Request, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{ApiError, GatewayError};

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<\s*script\b[^>]*>.*?<\s*/\s*script\s*>").unwrap());
static SCRIPT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<\s*/?\s*script\b[^>]*>").unwrap());
static JS_URI: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)javascript\s*:").unwrap());
static EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bon[a-z]+\s*=").unwrap());

fn strip_once(input: &str) -> Option<String> {
    let mut out: Option<String> = None;
    for pattern in [&*SCRIPT_BLOCK, &*SCRIPT_TAG, &*JS_URI, &*EVENT_HANDLER] {
        let source = out.as_deref().unwrap_or(input);
        let replaced = match pattern.replace_all(source, "") {
            Cow::Owned(replaced) => Some(replaced),
            Cow::Borrowed(_) => None,
        };
        if replaced.is_some() {
            out = replaced;
        }
    }
    out
}

/// Remove script constructs from one string. Borrowed when already clean.
pub fn clean_str(input: &str) -> Cow<'_, str> {
    let Some(mut current) = strip_once(input) else {
        return Cow::Borrowed(input);
    };
    // Each pass that changes the text shortens it, so this terminates.
    while let Some(next) = strip_once(&current) {
        current = next;
    }
    Cow::Owned(current)
}

/// Clean every string leaf of a JSON value, keys included.
pub fn clean_value(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let cleaned = match clean_str(&s) {
                Cow::Owned(cleaned) => Some(cleaned),
                Cow::Borrowed(_) => None,
            };
            Value::String(cleaned.unwrap_or(s))
        }
        Value::Array(items) => Value::Array(items.into_iter().map(clean_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (clean_str(&key).into_owned(), clean_value(value)))
                .collect(),
        ),
        other => other,
    }
}

/// Request-level sanitizer settings.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    max_body_size: usize,
}

impl Sanitizer {
    pub fn new(max_body_size: usize) -> Self {
        Self { max_body_size }
    }

    /// Rewrite a query string; `None` when nothing needed cleaning.
    pub fn clean_query(query: &str) -> Option<String> {
        let mut changed = false;
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .map(|(key, value)| {
                let (k, v) = (clean_str(&key).into_owned(), clean_str(&value).into_owned());
                changed |= k != key || v != value;
                (k, v)
            })
            .collect();

        changed.then(|| {
            url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish()
        })
    }

    async fn clean_body(&self, body: Body) -> Result<Option<Vec<u8>>, GatewayError> {
        let bytes = to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| GatewayError::InvalidPayload(format!("failed to read body: {e}")))?;
        if bytes.is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::InvalidPayload(format!("malformed JSON: {e}")))?;
        serde_json::to_vec(&clean_value(value))
            .map(Some)
            .map_err(|e| GatewayError::Internal(e.to_string()))
    }
}

fn rewrite_query(uri: &Uri, query: &str) -> Option<Uri> {
    let path_and_query = PathAndQuery::try_from(format!("{}?{}", uri.path(), query)).ok()?;
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    Uri::from_parts(parts).ok()
}

/// Whether the request declares a JSON body.
pub fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json") || ct.contains("+json"))
}

/// Clean the query string and JSON body before any other stage sees them.
pub async fn sanitize_request(
    State(sanitizer): State<Arc<Sanitizer>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();

    if let Some(cleaned) = parts.uri.query().and_then(Sanitizer::clean_query) {
        if let Some(uri) = rewrite_query(&parts.uri, &cleaned) {
            tracing::debug!(path = %parts.uri.path(), "Stripped script content from query");
            parts.uri = uri;
        }
    }

    if !is_json(&parts.headers) {
        return next.run(Request::from_parts(parts, body)).await;
    }

    match sanitizer.clean_body(body).await {
        Ok(Some(cleaned)) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            next.run(Request::from_parts(parts, Body::from(cleaned))).await
        }
        Ok(None) => next.run(Request::from_parts(parts, Body::empty())).await,
        Err(err) => ApiError::for_request(err, &Request::from_parts(parts, ())).into_response(),
    }
}
