//! Request validation layers.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{RawPathParams, State},
    http::{header, uri::PathAndQuery, HeaderMap, HeaderValue, Request, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    RequestPartsExt,
};
use serde_json::{Map, Value};

use crate::error::{ApiError, GatewayError};
use crate::security::sanitize::is_json;
use crate::validation::object_id::check_path_ids;
use crate::validation::schema::{Schema, Source};

/// Cleaned query parameters, for handlers that need typed values.
#[derive(Debug, Clone, Default)]
pub struct ValidatedQuery(pub Value);

/// Cleaned path parameters.
#[derive(Debug, Clone, Default)]
pub struct ValidatedPath(pub Value);

/// Middleware state: the schema and which part of the request it covers.
#[derive(Clone)]
pub struct ValidationGuard {
    pub schema: Arc<Schema>,
    pub source: Source,
}

/// Parse a query string into an object; repeated keys become arrays.
pub fn query_to_value(query: &str) -> Value {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }
    Value::Object(map)
}

/// Serialize a cleaned object back into a query string.
pub fn value_to_query(value: &Value) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    if let Value::Object(map) = value {
        for (key, value) in map {
            match value {
                Value::Array(items) => {
                    for item in items {
                        serializer.append_pair(key, &scalar_text(item));
                    }
                }
                other => {
                    serializer.append_pair(key, &scalar_text(other));
                }
            }
        }
    }
    serializer.finish()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn with_query(uri: &Uri, query: &str) -> Result<Uri, GatewayError> {
    let path_and_query = if query.is_empty() {
        PathAndQuery::try_from(uri.path())
    } else {
        PathAndQuery::try_from(format!("{}?{}", uri.path(), query))
    }
    .map_err(|e| GatewayError::Internal(format!("cannot rebuild query: {e}")))?;

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    Uri::from_parts(parts).map_err(|e| GatewayError::Internal(format!("cannot rebuild uri: {e}")))
}

/// Only JSON bodies are accepted: the sanitizer skips every other content type.
async fn validate_body(schema: &Schema, headers: &HeaderMap, body: Body) -> Result<Value, GatewayError> {
    // Size is bounded by the body limit layer
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| GatewayError::InvalidPayload(format!("failed to read body: {e}")))?;
    let input = if bytes.is_empty() {
        Value::Null
    } else if !is_json(headers) {
        return Err(GatewayError::InvalidPayload(
            "Content-Type must be application/json".into(),
        ));
    } else {
        serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::InvalidPayload(format!("malformed JSON: {e}")))?
    };
    schema
        .validate(&input, Source::Body)
        .map_err(GatewayError::Validation)
}

/// Replace the body or query with its validated form, or reject with every field error.
pub async fn validate_request(
    State(guard): State<ValidationGuard>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();

    let outcome = match guard.source {
        Source::Body => {
            let validated = validate_body(&guard.schema, &parts.headers, body).await;
            validated.and_then(|clean| {
                let bytes =
                    serde_json::to_vec(&clean).map_err(|e| GatewayError::Internal(e.to_string()))?;
                parts.headers.remove(header::CONTENT_LENGTH);
                parts
                    .headers
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Ok(Body::from(bytes))
            })
        }
        Source::Path => match parts.extract::<RawPathParams>().await {
            Ok(params) => {
                let input: Map<String, Value> = params
                    .iter()
                    .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
                    .collect();
                guard
                    .schema
                    .validate(&Value::Object(input), Source::Path)
                    .map_err(GatewayError::Validation)
                    .map(|clean| {
                        parts.extensions.insert(ValidatedPath(clean));
                        body
                    })
            }
            Err(e) => Err(GatewayError::Internal(format!("path parameters unavailable: {e}"))),
        },
        Source::Query => {
            let input = query_to_value(parts.uri.query().unwrap_or_default());
            guard
                .schema
                .validate(&input, Source::Query)
                .map_err(GatewayError::Validation)
                .and_then(|clean| {
                    parts.uri = with_query(&parts.uri, &value_to_query(&clean))?;
                    parts.extensions.insert(ValidatedQuery(clean));
                    Ok(body)
                })
        }
    };

    match outcome {
        Ok(body) => next.run(Request::from_parts(parts, body)).await,
        Err(err) => ApiError::for_request(err, &Request::from_parts(parts, ())).into_response(),
    }
}

/// Reject path parameters that are not well-formed document ids.
pub async fn require_object_ids(
    State(names): State<&'static [&'static str]>,
    params: RawPathParams,
    req: Request<Body>,
    next: Next,
) -> Response {
    match check_path_ids(params.iter(), names) {
        Ok(()) => next.run(req).await,
        Err(errors) => {
            ApiError::for_request(GatewayError::Validation(errors), &req).into_response()
        }
    }
}
