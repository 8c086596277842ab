//! Pipeline error definitions.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::store::StoreError;

/// Reasons the authenticator (or a guard that needs a principal) refuses a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCode {
    NoToken,
    TokenInvalid,
    TokenExpired,
    UserNotFound,
    AccountInactive,
    NotAuthenticated,
    InvalidCredentials,
}

impl AuthCode {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthCode::NoToken => "NO_TOKEN",
            AuthCode::TokenInvalid => "TOKEN_INVALID",
            AuthCode::TokenExpired => "TOKEN_EXPIRED",
            AuthCode::UserNotFound => "USER_NOT_FOUND",
            AuthCode::AccountInactive => "ACCOUNT_INACTIVE",
            AuthCode::NotAuthenticated => "NOT_AUTHENTICATED",
            AuthCode::InvalidCredentials => "INVALID_CREDENTIALS",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            AuthCode::NoToken => "Access denied. No token provided",
            AuthCode::TokenInvalid => "Invalid token",
            AuthCode::TokenExpired => "Token expired",
            AuthCode::UserNotFound => "User not found for token",
            AuthCode::AccountInactive => "Account is deactivated",
            AuthCode::NotAuthenticated => "Authentication required",
            AuthCode::InvalidCredentials => "Invalid email or password",
        }
    }
}

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

/// Errors raised by the admission pipeline and the handlers behind it.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credential missing, unusable or bound to no usable identity.
    #[error("{}", .0.message())]
    Unauthenticated(AuthCode),

    /// The actor is known but does not own the target resource.
    #[error("Not authorized to modify this {resource}")]
    Forbidden { resource: String },

    /// Referenced resource does not exist.
    #[error("{resource} not found")]
    NotFound { resource: String, id: String },

    /// Payload failed schema validation.
    #[error("Validation failed: {} error(s)", .0.len())]
    Validation(Vec<FieldError>),

    /// Body could not be read or parsed.
    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),

    /// Declared body length is over the configured limit.
    #[error("Request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    /// The request did not finish within the configured time.
    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Client exhausted the quota of a rate-limit tier.
    #[error("Too many requests, please try again later")]
    RateLimited {
        tier: &'static str,
        limit: u32,
        retry_after_ms: u64,
    },

    /// Write rejected because of concurrent or duplicate state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource store or identity store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        GatewayError::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }
}

/// Result type for pipeline operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
