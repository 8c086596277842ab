//! Configuration validation.
//!
//! Semantic checks only; serde already handled syntax. Every problem is
//! reported, not just the first.

use std::net::SocketAddr;

use crate::config::schema::{GatewayConfig, TierConfig, PLACEHOLDER_SECRET};

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    if config.auth.jwt_secret.trim().is_empty() {
        errors.push(ValidationError::new("auth.jwt_secret", "must not be empty"));
    } else if config.auth.jwt_secret == PLACEHOLDER_SECRET {
        tracing::warn!("auth.jwt_secret is the built-in placeholder; set a real secret");
    }

    let rl = &config.rate_limit;
    for (name, tier) in [
        ("general", &rl.general),
        ("auth", &rl.auth),
        ("password_reset", &rl.password_reset),
        ("upload", &rl.upload),
        ("community", &rl.community),
    ] {
        check_tier(name, tier, &mut errors);
    }

    for (class, policy) in &config.retry_policies {
        let field = |f: &str| format!("retry_policies.{class}.{f}");
        if policy.max_attempts == 0 {
            errors.push(ValidationError::new(field("max_attempts"), "must be >= 1"));
        }
        if policy.backoff_multiplier < 1.0 || !policy.backoff_multiplier.is_finite() {
            errors.push(ValidationError::new(
                field("backoff_multiplier"),
                "must be a finite number >= 1.0",
            ));
        }
        if policy.base_delay_ms > policy.max_delay_ms {
            errors.push(ValidationError::new(
                field("base_delay_ms"),
                "must not exceed max_delay_ms",
            ));
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_tier(name: &str, tier: &TierConfig, errors: &mut Vec<ValidationError>) {
    if tier.window_ms == 0 {
        errors.push(ValidationError::new(
            format!("rate_limit.{name}.window_ms"),
            "must be > 0",
        ));
    }
    if tier.limit == 0 {
        errors.push(ValidationError::new(
            format!("rate_limit.{name}.limit"),
            "must be > 0",
        ));
    }
}
