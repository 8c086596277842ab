//! Closed failure taxonomy.

use axum::http::StatusCode;
use serde::Serialize;

/// One entry of the failure taxonomy.
///
/// Every failure that crosses the pipeline boundary maps to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Network,
    Validation,
    Auth,
    Authorization,
    RateLimit,
    NotFound,
    Offline,
    Conflict,
    Server,
}

/// How a kind may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Safe to retry automatically after a backoff.
    Automatic,
    /// Retry only once the caller resolved the underlying state.
    AfterResolution,
    /// Retrying the same request cannot succeed.
    Never,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::Network,
        ErrorKind::Validation,
        ErrorKind::Auth,
        ErrorKind::Authorization,
        ErrorKind::RateLimit,
        ErrorKind::NotFound,
        ErrorKind::Offline,
        ErrorKind::Conflict,
        ErrorKind::Server,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Auth => "AUTH",
            ErrorKind::Authorization => "AUTHORIZATION",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Offline => "OFFLINE",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Server => "SERVER",
        }
    }

    pub fn retry_mode(self) -> RetryMode {
        match self {
            ErrorKind::Network | ErrorKind::RateLimit | ErrorKind::Offline | ErrorKind::Server => {
                RetryMode::Automatic
            }
            ErrorKind::Conflict => RetryMode::AfterResolution,
            ErrorKind::Validation
            | ErrorKind::Auth
            | ErrorKind::Authorization
            | ErrorKind::NotFound => RetryMode::Never,
        }
    }

    /// Whether the orchestrator may retry this kind on its own.
    pub fn retryable(self) -> bool {
        self.retry_mode() == RetryMode::Automatic
    }

    /// Suggested wait before the client tries again.
    pub fn default_retry_after_ms(self) -> Option<u64> {
        match self {
            ErrorKind::Network => Some(1_000),
            ErrorKind::Offline => Some(5_000),
            ErrorKind::RateLimit => Some(60_000),
            ErrorKind::Server => Some(30_000),
            _ => None,
        }
    }

    /// Code used when the raw failure did not carry one.
    pub fn default_code(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Auth => "AUTH_ERROR",
            ErrorKind::Authorization => "AUTHORIZATION_ERROR",
            ErrorKind::RateLimit => "RATE_LIMIT_EXCEEDED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Offline => "OFFLINE",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Server => "SERVER_ERROR",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Network => StatusCode::BAD_GATEWAY,
            ErrorKind::Offline => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Server => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
