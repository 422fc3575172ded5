//! Admission control keyed by caller and operation.
//!
//! Limits are sliding windows: at most `max_requests` admissions per
//! `window_secs`. [`StoreRateLimiter`] keeps each window in a store
//! document so every engine instance sharing the store enforces the same
//! budget. A store failure admits the request: rate limiting protects the
//! store, it must not become a second way for the store to fail callers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gamify_store::{keys, transact, DocumentStore, StoreError};
use gamify_types::{Clock, Timestamp};
use serde::{Deserialize, Serialize};

pub const APPLY_TRANSACTION: &str = "apply_transaction";
pub const BATCH_APPLY: &str = "batch_apply";
pub const CAST_VOTE: &str = "cast_vote";
pub const CONCLUDE_VOTING: &str = "conclude_voting";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimit {
    pub const fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window_secs: 60,
        }
    }
}

/// Limits applied when the configuration does not name its own.
pub fn default_limits() -> BTreeMap<String, RateLimit> {
    [
        (BATCH_APPLY, RateLimit::per_minute(5)),
        (CAST_VOTE, RateLimit::per_minute(20)),
        (CONCLUDE_VOTING, RateLimit::per_minute(5)),
        (APPLY_TRANSACTION, RateLimit::per_minute(30)),
    ]
    .into_iter()
    .map(|(op, limit)| (op.to_string(), limit))
    .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Admissions left in the current window after this one.
    pub remaining: u32,
    /// When a denied caller may try again.
    pub retry_after: Option<Duration>,
}

impl RateDecision {
    pub fn allow(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: None,
        }
    }

    pub fn deny(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after: Some(retry_after),
        }
    }
}

/// Check-and-consume admission for one request.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, caller: &str, operation: &str) -> RateDecision;
}

/// Admission timestamps inside the current window.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RateWindow {
    #[serde(default)]
    admitted: Vec<u64>,
}

pub struct StoreRateLimiter {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    limits: BTreeMap<String, RateLimit>,
}

impl StoreRateLimiter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        limits: BTreeMap<String, RateLimit>,
    ) -> Self {
        Self {
            store,
            clock,
            limits,
        }
    }

    async fn consume(
        &self,
        caller: &str,
        operation: &str,
        limit: RateLimit,
        now: Timestamp,
    ) -> Result<RateDecision, StoreError> {
        let key = keys::rate_limit(operation, caller);
        transact(self.store.as_ref(), |txn| {
            let mut window = txn.get_as::<RateWindow>(&key)?.unwrap_or_default();
            let floor = now.as_secs().saturating_sub(limit.window_secs);
            window.admitted.retain(|&at| at > floor);

            if window.admitted.len() >= limit.max_requests as usize {
                let oldest = window.admitted.iter().copied().min().unwrap_or(now.as_secs());
                let wait = (oldest + limit.window_secs).saturating_sub(now.as_secs()).max(1);
                // Persist the pruned window; nothing is consumed.
                txn.set_as(key.clone(), &window)?;
                return Ok(RateDecision::deny(Duration::from_secs(wait)));
            }
            window.admitted.push(now.as_secs());
            txn.set_as(key.clone(), &window)?;
            let used = window.admitted.len() as u32;
            Ok(RateDecision::allow(limit.max_requests.saturating_sub(used)))
        })
        .await
    }
}

#[async_trait]
impl RateLimiter for StoreRateLimiter {
    async fn check(&self, caller: &str, operation: &str) -> RateDecision {
        let Some(limit) = self.limits.get(operation).copied() else {
            return RateDecision::allow(u32::MAX);
        };
        let now = self.clock.now();
        match self.consume(caller, operation, limit, now).await {
            Ok(decision) => {
                if !decision.allowed {
                    tracing::warn!(
                        caller,
                        operation,
                        max_requests = limit.max_requests,
                        window_secs = limit.window_secs,
                        retry_after_secs = decision.retry_after.map_or(0, |d| d.as_secs()),
                        "rate limit exceeded"
                    );
                }
                decision
            }
            Err(err) => {
                tracing::warn!(
                    caller,
                    operation,
                    error = %err,
                    "rate limiter unavailable, admitting"
                );
                RateDecision::allow(0)
            }
        }
    }
}

/// Fixed answer for every request; counts how often it was asked.
pub struct StaticRateLimiter {
    allowed: bool,
    checks: AtomicUsize,
}

impl StaticRateLimiter {
    pub fn allow_all() -> Self {
        Self {
            allowed: true,
            checks: AtomicUsize::new(0),
        }
    }

    pub fn deny_all() -> Self {
        Self {
            allowed: false,
            checks: AtomicUsize::new(0),
        }
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RateLimiter for StaticRateLimiter {
    async fn check(&self, caller: &str, operation: &str) -> RateDecision {
        self.checks.fetch_add(1, Ordering::Relaxed);
        if self.allowed {
            RateDecision::allow(u32::MAX)
        } else {
            tracing::warn!(caller, operation, "rate limit exceeded");
            RateDecision::deny(Duration::from_secs(60))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamify_nullables::{FaultScope, NullClock, NullStore};

    fn limiter(limits: &[(&str, RateLimit)]) -> (Arc<NullStore>, Arc<NullClock>, StoreRateLimiter) {
        let store = Arc::new(NullStore::new());
        let clock = Arc::new(NullClock::new(10_000));
        let limits = limits
            .iter()
            .map(|(op, limit)| (op.to_string(), *limit))
            .collect();
        let limiter = StoreRateLimiter::new(store.clone(), clock.clone(), limits);
        (store, clock, limiter)
    }

    #[tokio::test]
    async fn admits_up_to_the_limit_then_denies() {
        let (_store, _clock, limiter) = limiter(&[(CAST_VOTE, RateLimit::per_minute(3))]);
        let remaining: Vec<u32> = [
            limiter.check("ana", CAST_VOTE).await,
            limiter.check("ana", CAST_VOTE).await,
            limiter.check("ana", CAST_VOTE).await,
        ]
        .iter()
        .map(|d| {
            assert!(d.allowed);
            d.remaining
        })
        .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = limiter.check("ana", CAST_VOTE).await;
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(Duration::from_secs(60)));

        // Other callers have their own window.
        assert!(limiter.check("bia", CAST_VOTE).await.allowed);
    }

    #[tokio::test]
    async fn window_slides() {
        let (_store, clock, limiter) = limiter(&[(BATCH_APPLY, RateLimit::per_minute(2))]);
        assert!(limiter.check("ana", BATCH_APPLY).await.allowed);
        clock.advance(30);
        assert!(limiter.check("ana", BATCH_APPLY).await.allowed);
        let denied = limiter.check("ana", BATCH_APPLY).await;
        assert_eq!(denied.retry_after, Some(Duration::from_secs(30)));

        clock.advance(30);
        assert!(limiter.check("ana", BATCH_APPLY).await.allowed);
    }

    #[tokio::test]
    async fn unlisted_operations_are_unlimited() {
        let (store, _clock, limiter) = limiter(&[]);
        for _ in 0..50 {
            assert!(limiter.check("ana", "open_voting").await.allowed);
        }
        assert_eq!(store.count(keys::RATE_LIMITS), 0);
    }

    #[tokio::test]
    async fn store_failure_fails_open() {
        let (store, _clock, limiter) = limiter(&[(CAST_VOTE, RateLimit::per_minute(1))]);
        store.fail_next(1, FaultScope::Any, StoreError::Unavailable("down".into()));
        assert!(limiter.check("ana", CAST_VOTE).await.allowed);
    }

    #[tokio::test]
    async fn static_limiter_counts_checks() {
        let deny = StaticRateLimiter::deny_all();
        assert!(!deny.check("ana", BATCH_APPLY).await.allowed);
        assert!(!deny.check("ana", BATCH_APPLY).await.allowed);
        assert_eq!(deny.checks(), 2);
    }
}
