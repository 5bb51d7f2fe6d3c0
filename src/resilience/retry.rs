//! Pure exponential-backoff delay computation (§4.2/§4.7), shared by
//! provider-level retries and the scheduler's task-level retry.

use std::time::Duration;

use crate::config::RetryConfig;

/// Computes the delay before attempt number `attempt` (1-indexed: the
/// delay before the *second* attempt, after the first failure, is
/// `next_delay(config, 1)`). Capped at `config.max_delay`.
pub fn next_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let scaled = config.initial_delay.as_secs_f64() * config.multiplier.powi(exponent as i32);
    let capped = scaled.min(config.max_delay.as_secs_f64());
    Duration::from_secs_f64(capped)
}

/// Whether the retry loop should attempt again after `attempt` failures.
pub fn should_retry(config: &RetryConfig, attempt: u32) -> bool {
    attempt < config.max_attempts
}
