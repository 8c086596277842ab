//! Named retry policies.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Attempt count and backoff shape for one class of operation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Inflate each delay by up to 10%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub const fn new(
        max_attempts: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
        jitter: bool,
    ) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier,
            jitter,
        }
    }

    /// Never retries.
    pub const fn single_attempt() -> Self {
        Self::new(1, 0, 0, 1.0, false)
    }
}

pub const DEFAULT_CLASS: &str = "default";

/// Policies keyed by operation class.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyTable {
    policies: HashMap<String, RetryPolicy>,
}

impl PolicyTable {
    /// Built-in classes.
    pub fn builtin() -> Self {
        let policies = [
            (DEFAULT_CLASS, RetryPolicy::default()),
            ("network-call", RetryPolicy::new(3, 1_000, 10_000, 2.0, true)),
            ("data-fetch", RetryPolicy::new(3, 500, 5_000, 1.5, true)),
            ("data-mutation", RetryPolicy::new(2, 1_000, 4_000, 2.0, true)),
            ("file-upload", RetryPolicy::new(2, 2_000, 8_000, 2.0, true)),
            ("auth", RetryPolicy::single_attempt()),
        ]
        .into_iter()
        .map(|(name, policy)| (name.to_string(), policy))
        .collect();

        Self { policies }
    }

    /// Built-in classes with `overrides` replacing or adding entries.
    pub fn with_overrides(overrides: &HashMap<String, RetryPolicy>) -> Self {
        let mut table = Self::builtin();
        for (class, policy) in overrides {
            table.insert(class.clone(), policy.clone());
        }
        table
    }

    pub fn insert(&mut self, class: impl Into<String>, policy: RetryPolicy) {
        self.policies.insert(class.into(), policy);
    }

    /// Policy for `class`, or the default one for unknown classes.
    pub fn resolve(&self, class: &str) -> RetryPolicy {
        match self.policies.get(class) {
            Some(policy) => policy.clone(),
            None => {
                tracing::debug!(operation_class = class, "Unknown retry class, using default policy");
                self.policies
                    .get(DEFAULT_CLASS)
                    .cloned()
                    .unwrap_or_default()
            }
        }
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}
