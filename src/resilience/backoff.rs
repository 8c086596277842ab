//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::resilience::policy::RetryPolicy;

/// Delay before attempt `attempt + 1`, without jitter.
///
/// `min(max_delay, base_delay × multiplier^(attempt − 1))`; attempt 0 has no delay.
pub fn exponential_delay_ms(policy: &RetryPolicy, attempt: u32) -> u64 {
    if attempt == 0 {
        return 0;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let raw = policy.base_delay_ms as f64 * policy.backoff_multiplier.powi(exponent);
    // f64::min ignores NaN and clamps overflow to the cap
    raw.min(policy.max_delay_ms as f64).max(0.0) as u64
}

/// Delay after failed attempt `attempt`, jittered when the policy asks for it.
pub fn calculate_backoff(policy: &RetryPolicy, attempt: u32) -> Duration {
    let delay_ms = exponential_delay_ms(policy, attempt);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = delay_ms / 10;
    let jitter = if policy.jitter && jitter_range > 0 {
        rand::thread_rng().gen_range(0..=jitter_range)
    } else {
        0
    };

    Duration::from_millis(delay_ms + jitter)
}
