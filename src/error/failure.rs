//! Raw failure view consumed by the classifier.
//!
//! Failures come from heterogeneous sources (pipeline stages, stores, sockets,
//! upstream services). Each source is flattened into a [`Failure`] carrying
//! the signals the classifier matches on: a type name, message text, an
//! optional status code, an optional custom code and an offline marker.

use crate::error::types::{FieldError, GatewayError};
use crate::store::StoreError;

/// Flattened description of something that went wrong.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Failure {
    pub name: Option<String>,
    pub message: String,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub offline: bool,
    pub retry_after_ms: Option<u64>,
    pub field_errors: Vec<FieldError>,
    /// Message was authored by the gateway and is safe to show to clients.
    pub exposable: bool,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn with_retry_after_ms(mut self, ms: u64) -> Self {
        self.retry_after_ms = Some(ms);
        self
    }

    pub fn with_field_errors(mut self, errors: Vec<FieldError>) -> Self {
        self.field_errors = errors;
        self
    }

    pub fn exposable(mut self) -> Self {
        self.exposable = true;
        self
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.code, self.status) {
            (Some(code), _) => write!(f, "{} ({})", self.message, code),
            (None, Some(status)) => write!(f, "{} (status {})", self.message, status),
            (None, None) => f.write_str(&self.message),
        }
    }
}

/// Anything that can be handed to the classifier.
pub trait AsFailure {
    fn as_failure(&self) -> Failure;
}

impl AsFailure for Failure {
    fn as_failure(&self) -> Failure {
        self.clone()
    }
}

impl AsFailure for GatewayError {
    fn as_failure(&self) -> Failure {
        let message = self.to_string();
        match self {
            GatewayError::Unauthenticated(code) => Failure::new(message)
                .with_name("AuthenticationError")
                .with_status(401)
                .with_code(code.as_str())
                .exposable(),
            GatewayError::Forbidden { .. } => Failure::new(message)
                .with_name("AuthorizationError")
                .with_status(403)
                .with_code("NOT_OWNER")
                .exposable(),
            GatewayError::NotFound { .. } => Failure::new(message)
                .with_name("NotFoundError")
                .with_status(404)
                .with_code("RESOURCE_NOT_FOUND")
                .exposable(),
            GatewayError::Validation(errors) => Failure::new(message)
                .with_name("ValidationError")
                .with_status(400)
                .with_code("VALIDATION_ERROR")
                .with_field_errors(errors.clone())
                .exposable(),
            GatewayError::InvalidPayload(_) => Failure::new(message)
                .with_name("ValidationError")
                .with_status(400)
                .with_code("INVALID_PAYLOAD")
                .exposable(),
            GatewayError::PayloadTooLarge { .. } => Failure::new(message)
                .with_name("ValidationError")
                .with_status(413)
                .with_code("PAYLOAD_TOO_LARGE")
                .exposable(),
            GatewayError::Timeout { .. } => Failure::new(message)
                .with_name("TimeoutError")
                .with_code("ETIMEDOUT")
                .exposable(),
            GatewayError::RateLimited { retry_after_ms, .. } => Failure::new(message)
                .with_name("RateLimitError")
                .with_status(429)
                .with_code("RATE_LIMIT_EXCEEDED")
                .with_retry_after_ms(*retry_after_ms)
                .exposable(),
            GatewayError::Conflict(_) => Failure::new(message)
                .with_name("ConflictError")
                .with_status(409)
                .with_code("CONFLICT")
                .exposable(),
            GatewayError::Store(err) => err.as_failure(),
            GatewayError::Io(err) => err.as_failure(),
            GatewayError::Internal(_) => Failure::new(message).with_name("InternalError"),
        }
    }
}

impl AsFailure for StoreError {
    fn as_failure(&self) -> Failure {
        let failure = Failure::new(self.to_string()).with_name("StoreError");
        match self {
            StoreError::Unavailable(_) => failure.with_code("NETWORK_ERROR"),
            StoreError::Timeout(_) => failure.with_code("ETIMEDOUT"),
            StoreError::Duplicate(_) => failure.with_status(409).with_code("DUPLICATE_KEY"),
            StoreError::Backend(_) => failure,
        }
    }
}

impl AsFailure for std::io::Error {
    fn as_failure(&self) -> Failure {
        use std::io::ErrorKind as Io;

        let failure = Failure::new(self.to_string()).with_name("IoError");
        let code = match self.kind() {
            Io::ConnectionRefused => Some("ECONNREFUSED"),
            Io::ConnectionReset | Io::ConnectionAborted => Some("ECONNRESET"),
            Io::TimedOut => Some("ETIMEDOUT"),
            Io::BrokenPipe => Some("EPIPE"),
            Io::NotConnected | Io::AddrNotAvailable => Some("ENETUNREACH"),
            _ => None,
        };
        match code {
            Some(code) => failure.with_code(code),
            None => failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::types::AuthCode;

    #[test]
    fn test_gateway_error_signals() {
        let failure = GatewayError::Unauthenticated(AuthCode::NoToken).as_failure();
        assert_eq!(failure.status, Some(401));
        assert_eq!(failure.code.as_deref(), Some("NO_TOKEN"));
        assert!(failure.exposable);

        let failure = GatewayError::Internal("db exploded".into()).as_failure();
        assert_eq!(failure.status, None);
        assert!(!failure.exposable);
    }

    #[test]
    fn test_io_error_codes() {
        let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(err.as_failure().code.as_deref(), Some("ECONNREFUSED"));

        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(err.as_failure().code, None);
    }

    #[test]
    fn test_layer_rejections_classify() {
        let classifier = crate::error::ErrorClassifier::standard();

        let too_large = classifier.classify_error(&GatewayError::PayloadTooLarge { limit: 64 }, None);
        assert_eq!(too_large.kind(), crate::error::ErrorKind::Validation);
        assert_eq!(too_large.code(), "PAYLOAD_TOO_LARGE");
        assert!(!too_large.retryable());

        let timed_out = classifier.classify_error(&GatewayError::Timeout { secs: 30 }, None);
        assert_eq!(timed_out.kind(), crate::error::ErrorKind::Network);
        assert!(timed_out.retryable());
    }
}
