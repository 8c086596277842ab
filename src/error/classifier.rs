//! Failure classification.
//!
//! Classification walks an ordered rule table; the first rule with a matching
//! signal decides the kind. Nothing matches → [`ErrorKind::Server`].
//!
//! ```text
//! 1. NETWORK        network codes (ECONNREFUSED, ETIMEDOUT, ...) or network text
//! 2. VALIDATION     status 400/422, ValidationError name, "validation" text
//! 3. AUTH           status 401, JWT error names, "unauthorized" text
//! 4. AUTHORIZATION  status 403, "forbidden" text
//! 5. RATE_LIMIT     status 429, "rate limit" text
//! 6. NOT_FOUND      status 404, "not found" text
//! 7. OFFLINE        offline marker, "offline" text
//! 8. CONFLICT       status 409, conflict / duplicate-key codes
//! *  SERVER         default
//! ```

use once_cell::sync::Lazy;

use crate::error::failure::{AsFailure, Failure};
use crate::error::kind::ErrorKind;
use crate::error::messages::{generic_message, MessageCatalog, RecoveryHint};
use crate::error::types::FieldError;

/// A single observable property of a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Status(u16),
    Code(&'static str),
    Name(&'static str),
    /// Lower-case substring of the message.
    Text(&'static str),
    OfflineMarker,
}

impl Signal {
    fn matches(&self, failure: &Failure, lowered: &str) -> bool {
        match self {
            Signal::Status(status) => failure.status == Some(*status),
            Signal::Code(code) => failure
                .code
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(code)),
            Signal::Name(name) => failure
                .name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name)),
            Signal::Text(text) => lowered.contains(text),
            Signal::OfflineMarker => failure.offline,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub kind: ErrorKind,
    pub signals: Vec<Signal>,
}

impl ClassificationRule {
    pub fn new(kind: ErrorKind, signals: Vec<Signal>) -> Self {
        Self { kind, signals }
    }

    fn matches(&self, failure: &Failure, lowered: &str) -> bool {
        self.signals.iter().any(|s| s.matches(failure, lowered))
    }
}

/// Outcome of classifying one failure.
///
/// Only [`ErrorClassifier`] builds these.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedError {
    kind: ErrorKind,
    code: String,
    message: String,
    user_message: String,
    retry_after_ms: Option<u64>,
    recovery: RecoveryHint,
    field_errors: Vec<FieldError>,
    detail: String,
}

impl ClassifiedError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Client-safe technical message.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after_ms
    }

    pub fn recovery(&self) -> &RecoveryHint {
        &self.recovery
    }

    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    /// Raw message of the original failure. Never sent to clients.
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// Maps raw failures onto the taxonomy.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<ClassificationRule>,
    messages: MessageCatalog,
}

static STANDARD: Lazy<ErrorClassifier> = Lazy::new(ErrorClassifier::default);

impl ErrorClassifier {
    pub fn new(rules: Vec<ClassificationRule>, messages: MessageCatalog) -> Self {
        Self { rules, messages }
    }

    /// Shared instance with the standard rule table and message catalog.
    pub fn standard() -> &'static ErrorClassifier {
        &STANDARD
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Determine the kind only.
    pub fn kind_of(&self, failure: &Failure) -> ErrorKind {
        let lowered = failure.message.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(failure, &lowered))
            .map(|rule| rule.kind)
            .unwrap_or(ErrorKind::Server)
    }

    pub fn classify(&self, failure: &Failure, operation: Option<&str>) -> ClassifiedError {
        let kind = self.kind_of(failure);

        let code = failure
            .code
            .clone()
            .unwrap_or_else(|| kind.default_code().to_string());
        let message = if failure.exposable {
            failure.message.clone()
        } else {
            generic_message(kind).to_string()
        };
        let retry_after_ms = match kind.retry_mode() {
            crate::error::kind::RetryMode::Never => None,
            _ => failure
                .retry_after_ms
                .or_else(|| kind.default_retry_after_ms()),
        };

        ClassifiedError {
            kind,
            code,
            message,
            user_message: self.messages.user_message(operation, kind),
            retry_after_ms,
            recovery: RecoveryHint::for_kind(kind),
            field_errors: failure.field_errors.clone(),
            detail: failure.message.clone(),
        }
    }

    pub fn classify_error<E: AsFailure + ?Sized>(
        &self,
        error: &E,
        operation: Option<&str>,
    ) -> ClassifiedError {
        self.classify(&error.as_failure(), operation)
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(standard_rules(), MessageCatalog::default())
    }
}

/// The ordered rule table used by [`ErrorClassifier::standard`].
pub fn standard_rules() -> Vec<ClassificationRule> {
    use Signal::*;

    vec![
        ClassificationRule::new(
            ErrorKind::Network,
            vec![
                Code("NETWORK_ERROR"),
                Code("ECONNREFUSED"),
                Code("ECONNRESET"),
                Code("ETIMEDOUT"),
                Code("ENOTFOUND"),
                Code("EAI_AGAIN"),
                Code("ENETUNREACH"),
                Code("EPIPE"),
                Name("NetworkError"),
                Text("network"),
                Text("fetch failed"),
                Text("connection refused"),
                Text("connection reset"),
                Text("timed out"),
                Text("timeout"),
            ],
        ),
        ClassificationRule::new(
            ErrorKind::Validation,
            vec![
                Status(400),
                Status(422),
                Name("ValidationError"),
                Name("CastError"),
                Text("validation"),
            ],
        ),
        ClassificationRule::new(
            ErrorKind::Auth,
            vec![
                Status(401),
                Name("JsonWebTokenError"),
                Name("TokenExpiredError"),
                Text("unauthorized"),
                Text("jwt"),
            ],
        ),
        ClassificationRule::new(
            ErrorKind::Authorization,
            vec![Status(403), Text("forbidden")],
        ),
        ClassificationRule::new(
            ErrorKind::RateLimit,
            vec![Status(429), Text("rate limit"), Text("too many requests")],
        ),
        ClassificationRule::new(ErrorKind::NotFound, vec![Status(404), Text("not found")]),
        ClassificationRule::new(ErrorKind::Offline, vec![OfflineMarker, Text("offline")]),
        ClassificationRule::new(
            ErrorKind::Conflict,
            vec![
                Status(409),
                Code("CONFLICT"),
                Code("DUPLICATE_KEY"),
                Code("E11000"),
                Text("conflict"),
                Text("duplicate key"),
            ],
        ),
    ]
}
