//! Retry with exponential backoff.
//!
//! [`RetryPolicy::execute`] re-runs an async operation while a caller-supplied
//! classifier reports its failure as [`ErrorClass::Retryable`]. Permanent
//! failures abort immediately without consuming the remaining attempts.
//! The delay before retry `n` (0-indexed) is `min(base * factor^n, max)`,
//! optionally jittered.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder, Retryable};

/// How a failure should be treated by the executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timeouts, connectivity loss, store contention.
    Retryable,
    /// Validation, not-found, permission. Surfaced immediately.
    Permanent,
}

impl ErrorClass {
    pub fn from_transient(transient: bool) -> Self {
        if transient {
            ErrorClass::Retryable
        } else {
            ErrorClass::Permanent
        }
    }
}

/// Attempt budget and delay curve for one retried operation.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: f32,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the operation exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Un-jittered delay before retry `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let scaled = base * f64::from(self.factor).powi(attempt as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    fn builder(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(self.max_attempts.saturating_sub(1));
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }

    /// The sequence of delays the executor will sleep between attempts.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        self.builder().build()
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Returns the last error when every attempt failed.
    pub async fn execute<T, E, F, Fut, C>(
        &self,
        operation: &str,
        mut op: F,
        classify: C,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> ErrorClass,
        E: fmt::Display,
    {
        let attempts = AtomicUsize::new(0);

        let result = (|| {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::trace!(operation, attempt, "attempt started");
            op()
        })
        .retry(self.builder())
        .when(|err| classify(err) == ErrorClass::Retryable)
        .notify(|err, delay| {
            tracing::warn!(
                operation,
                attempt = attempts.load(Ordering::Relaxed),
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, backing off"
            );
        })
        .await;

        let attempt = attempts.load(Ordering::Relaxed);
        match &result {
            Ok(_) if attempt > 1 => {
                tracing::info!(operation, attempt, "succeeded after retry");
            }
            Ok(_) => {}
            Err(err) => {
                let class = classify(err);
                tracing::warn!(
                    operation,
                    attempt,
                    permanent = class == ErrorClass::Permanent,
                    error = %err,
                    "operation failed"
                );
            }
        }
        result
    }
}
