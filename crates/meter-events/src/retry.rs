// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded retry of a single fallible async operation.
//!
//! The caller decides which failures are worth retrying; everything else is
//! returned after the first attempt. Retryable failures are attempted again
//! following a [`RetryStrategy`] until the attempt ceiling is hit, at which
//! point the last error is returned.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff with jitter.
///
/// The wait before attempt `n + 1` is drawn uniformly from
/// `[min, clamp(multiplier * 2^(n - 1), min, max)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub attempts: u64,
    pub multiplier: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        ExponentialBackoff {
            attempts: 5,
            multiplier: Duration::from_secs(2),
            min: Duration::from_secs(4),
            max: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Retry right away, up to the given number of attempts.
    Immediate(u64),
    /// Attempts, fixed delay in milliseconds.
    LinearBackoff(u64, u64),
    ExponentialBackoff(ExponentialBackoff),
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::ExponentialBackoff(ExponentialBackoff::default())
    }
}

impl RetryStrategy {
    /// Total number of attempts, including the first one. Never less than one.
    #[must_use]
    pub fn max_attempts(&self) -> u64 {
        let attempts = match self {
            RetryStrategy::Immediate(attempts) | RetryStrategy::LinearBackoff(attempts, _) => {
                *attempts
            }
            RetryStrategy::ExponentialBackoff(backoff) => backoff.attempts,
        };
        attempts.max(1)
    }

    /// Delay to wait after the given (1-based) failed attempt.
    #[must_use]
    pub fn delay(&self, attempt: u64) -> Duration {
        match self {
            RetryStrategy::Immediate(_) => Duration::ZERO,
            RetryStrategy::LinearBackoff(_, delay_ms) => Duration::from_millis(*delay_ms),
            RetryStrategy::ExponentialBackoff(backoff) => {
                let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                let factor = 2_u32.checked_pow(exponent).unwrap_or(u32::MAX);
                let upper = backoff
                    .multiplier
                    .saturating_mul(factor)
                    .clamp(backoff.min, backoff.max.max(backoff.min));

                let spread = upper.saturating_sub(backoff.min).as_millis();
                let jitter = u64::try_from(spread)
                    .map(|spread| fastrand::u64(0..=spread))
                    .unwrap_or(0);
                backoff.min + Duration::from_millis(jitter)
            }
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// strategy runs out of attempts.
pub async fn send_with_retry<T, E, Op, Fut, P>(
    strategy: &RetryStrategy,
    is_retryable: P,
    mut op: Op,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = strategy.max_attempts();
    let mut attempts = 0;

    loop {
        attempts += 1;
        match op().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!("RETRY | Succeeded after {attempts} attempts");
                }
                return Ok(value);
            }
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) if attempts >= max_attempts => {
                debug!("RETRY | Giving up after {attempts} attempts");
                return Err(e);
            }
            Err(e) => {
                let delay = strategy.delay(attempts);
                warn!(
                    "RETRY | Attempt {attempts}/{max_attempts} failed, retrying in {} ms: {e}",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
