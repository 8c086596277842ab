//! Retry orchestration.
//!
//! # Responsibilities
//! - Resolve the retry policy of an operation class
//! - Classify each failure and stop on non-retryable kinds
//! - Sleep with exponential backoff between attempts without blocking other tasks
//! - Stop scheduling attempts once the caller's token is cancelled
//!
//! # Design Decisions
//! - Retry eligibility comes from the classifier only, delays from the policy only
//! - The original failure is handed back untouched
//! - An in-flight attempt is never interrupted; cancellation applies between attempts

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::error::{AsFailure, ErrorClassifier, ErrorKind};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::cancel::CancelToken;
use crate::resilience::policy::{PolicyTable, RetryPolicy};

/// Why [`RetryOrchestrator::run`] gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Last failure, either non-retryable or the final permitted attempt.
    #[error("{error}")]
    Failed {
        attempts: u32,
        kind: ErrorKind,
        error: E,
    },

    /// The caller cancelled before another attempt could be scheduled.
    #[error("operation cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32, last_error: Option<E> },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Failed { attempts, .. } | RetryError::Cancelled { attempts, .. } => {
                *attempts
            }
        }
    }

    /// The original failure, if an attempt ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Failed { error, .. } => Some(error),
            RetryError::Cancelled { last_error, .. } => last_error,
        }
    }
}

/// Runs operations under named retry policies.
pub struct RetryOrchestrator {
    policies: ArcSwap<PolicyTable>,
    classifier: Arc<ErrorClassifier>,
}

impl RetryOrchestrator {
    pub fn new(policies: PolicyTable, classifier: Arc<ErrorClassifier>) -> Self {
        Self {
            policies: ArcSwap::from_pointee(policies),
            classifier,
        }
    }

    pub fn policy(&self, class: &str) -> RetryPolicy {
        self.policies.load().resolve(class)
    }

    /// Swap the policy table; runs already in progress keep their policy.
    pub fn replace_policies(&self, policies: PolicyTable) {
        self.policies.store(Arc::new(policies));
    }

    pub async fn run<T, E, F, Fut>(
        &self,
        class: &str,
        cancel: &CancelToken,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: AsFailure,
    {
        let policy = self.policy(class);
        let max_attempts = policy.max_attempts.max(1);
        let mut last_error = None;
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                tracing::debug!(operation_class = class, attempt, "Retry loop cancelled");
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last_error,
                });
            }
            attempt += 1;

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation_class = class, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let classified = self.classifier.classify_error(&error, None);
            let kind = classified.kind();

            if !classified.retryable() {
                tracing::debug!(
                    operation_class = class,
                    attempt,
                    kind = %kind,
                    "Failure is not retryable"
                );
                return Err(RetryError::Failed {
                    attempts: attempt,
                    kind,
                    error,
                });
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    operation_class = class,
                    attempts = attempt,
                    kind = %kind,
                    detail = classified.detail(),
                    "Retries exhausted"
                );
                metrics::record_retry_exhausted(class);
                return Err(RetryError::Failed {
                    attempts: attempt,
                    kind,
                    error,
                });
            }

            let delay = calculate_backoff(&policy, attempt);
            tracing::info!(
                operation_class = class,
                attempt,
                kind = %kind,
                delay_ms = delay.as_millis() as u64,
                "Retrying operation"
            );
            metrics::record_retry(class);
            last_error = Some(error);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    tracing::debug!(operation_class = class, attempt, "Retry backoff cancelled");
                    return Err(RetryError::Cancelled { attempts: attempt, last_error });
                }
            }
        }
    }
}

impl Default for RetryOrchestrator {
    fn default() -> Self {
        Self::new(PolicyTable::builtin(), Arc::new(ErrorClassifier::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn orchestrator_with(class: &str, policy: RetryPolicy) -> RetryOrchestrator {
        let mut table = PolicyTable::builtin();
        table.insert(class, policy);
        RetryOrchestrator::new(table, Arc::new(ErrorClassifier::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let orchestrator = orchestrator_with("t", RetryPolicy::new(3, 100, 1_000, 2.0, false));
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<&str, _> = orchestrator
            .run("t", &CancelToken::new(), move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Failure::new("connection reset").with_code("ECONNRESET"))
                } else {
                    Ok("ok")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_is_not_retried() {
        let orchestrator = orchestrator_with("t", RetryPolicy::new(5, 100, 1_000, 2.0, false));
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), _> = orchestrator
            .run("t", &CancelToken::new(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Failure::new("version mismatch").with_status(409))
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            RetryError::Failed {
                attempts: 1,
                kind: ErrorKind::Conflict,
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_network_failure_waits_exact_backoff() {
        let orchestrator = orchestrator_with("t", RetryPolicy::new(3, 1_000, 10_000, 2.0, false));
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let start = tokio::time::Instant::now();
        let result: Result<(), _> = orchestrator
            .run("t", &CancelToken::new(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Failure::new("connection reset").with_code("ECONNRESET"))
            })
            .await;

        // 1000ms after the first attempt, 2000ms after the second, none after the last
        assert_eq!(start.elapsed(), std::time::Duration::from_millis(3_000));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(RetryError::Failed {
                attempts: 3,
                kind: ErrorKind::Network,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_request_is_not_retried() {
        let orchestrator = orchestrator_with("t", RetryPolicy::new(5, 1_000, 10_000, 2.0, false));
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let start = tokio::time::Instant::now();
        let result: Result<(), _> = orchestrator
            .run("t", &CancelToken::new(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Failure::new("bad input").with_status(400))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
        assert!(matches!(
            result,
            Err(RetryError::Failed {
                attempts: 1,
                kind: ErrorKind::Validation,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let orchestrator = orchestrator_with("t", RetryPolicy::new(5, 10_000, 10_000, 1.0, false));
        let token = CancelToken::new();
        let calls = AtomicU32::new(0);

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                token.cancel();
            })
        };

        let counter = &calls;
        let result: Result<(), _> = orchestrator
            .run("t", &token, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Failure::new("offline").offline())
            })
            .await;
        canceller.await.unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Cancelled { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.into_inner().is_some());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let orchestrator = RetryOrchestrator::default();
        let token = CancelToken::new();
        token.cancel();

        let result: Result<(), RetryError<Failure>> =
            orchestrator.run("data-fetch", &token, || async { Ok(()) }).await;
        assert!(matches!(
            result,
            Err(RetryError::Cancelled {
                attempts: 0,
                last_error: None
            })
        ));
    }
}
