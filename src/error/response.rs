//! JSON rejection envelope.
//!
//! [`ApiError`] is the only place a failure is classified on its way out:
//! the raw detail is logged, the client receives the envelope.

use axum::{
    http::{header, HeaderValue, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::classifier::{ClassifiedError, ErrorClassifier};
use crate::error::kind::ErrorKind;
use crate::error::messages::RecoveryHint;
use crate::error::types::{FieldError, GatewayError};
use crate::observability::metrics;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub user_message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    pub recovery: RecoveryHint,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    pub error: ErrorBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl ErrorEnvelope {
    pub fn from_classified(classified: &ClassifiedError) -> Self {
        let errors = if classified.field_errors().is_empty() {
            None
        } else {
            Some(classified.field_errors().to_vec())
        };
        Self {
            success: false,
            message: classified.user_message().to_string(),
            error: ErrorBody {
                kind: classified.kind(),
                code: classified.code().to_string(),
                message: classified.message().to_string(),
                user_message: classified.user_message().to_string(),
                retryable: classified.retryable(),
                retry_after: classified.retry_after_ms().map(ms_to_secs),
                recovery: classified.recovery().clone(),
            },
            errors,
        }
    }
}

/// Round a millisecond duration up to whole seconds.
pub fn ms_to_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}

/// Name of the operation a route performs, attached to each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation(pub &'static str);

/// A failure on its way to the client, tagged with the operation it interrupted.
#[derive(Debug)]
pub struct ApiError {
    error: GatewayError,
    operation: Option<&'static str>,
}

impl ApiError {
    pub fn new(error: GatewayError) -> Self {
        Self {
            error,
            operation: None,
        }
    }

    /// Tag with the [`Operation`] of the request, if the route set one.
    pub fn for_request<B>(error: GatewayError, request: &Request<B>) -> Self {
        Self {
            error,
            operation: request.extensions().get::<Operation>().map(|op| op.0),
        }
    }

    pub fn during(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn error(&self) -> &GatewayError {
        &self.error
    }

    pub fn classify(&self) -> ClassifiedError {
        ErrorClassifier::standard().classify_error(&self.error, self.operation)
    }
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        ApiError::new(error)
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        ApiError::new(GatewayError::Store(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let classified = self.classify();
        let operation = self.operation.unwrap_or("-");

        match classified.kind() {
            ErrorKind::Server | ErrorKind::Network | ErrorKind::Offline => tracing::error!(
                operation,
                kind = %classified.kind(),
                code = classified.code(),
                detail = classified.detail(),
                "Request failed"
            ),
            _ => tracing::debug!(
                operation,
                kind = %classified.kind(),
                code = classified.code(),
                detail = classified.detail(),
                "Request rejected"
            ),
        }
        metrics::record_error(classified.kind(), classified.code());

        classified_response(&classified)
    }
}

/// Render a classification as an HTTP response.
pub fn classified_response(classified: &ClassifiedError) -> Response {
    let envelope = ErrorEnvelope::from_classified(classified);
    let mut response = (classified.kind().status(), Json(envelope)).into_response();

    if classified.kind() == ErrorKind::RateLimit {
        if let Some(ms) = classified.retry_after_ms() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(ms_to_secs(ms)));
        }
    }
    response
}
