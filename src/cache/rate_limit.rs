//! Fixed-window rate limiting over the shared store
//!
//! Windows are aligned to wall-clock multiples of the window length, not
//! sliding. A burst straddling a boundary can therefore be admitted up to
//! twice the limit across the two windows.

use super::KvStore;
use crate::clock::Clock;
use crate::error::AgentError;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u64,
    pub window_secs: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limit: 5,
            window_secs: 60,
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, policy: RateLimitPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Count one request for `subject` under the configured policy.
    pub async fn check(&self, subject: &str) -> Result<u64> {
        self.check_with(subject, self.policy.limit, self.policy.window_secs)
            .await
    }

    /// Count one request for `subject`; fails once the count in the current
    /// window exceeds `limit`. The increment is kept even when rejected.
    pub async fn check_with(&self, subject: &str, limit: u64, window_secs: u64) -> Result<u64> {
        let window_secs = window_secs.max(1);
        let window_index = self.clock.now().timestamp().div_euclid(window_secs as i64);
        let key = format!("rate:{}:{}", subject, window_index);

        let count = self.store.increment(&key).await?;
        if count == 1 {
            self.store
                .expire(&key, Duration::from_secs(window_secs))
                .await?;
        }

        let count = count.max(0) as u64;
        debug!(subject, count, limit, window_index, "rate limit counted");

        if count > limit {
            warn!(subject, count, limit, "rate limit exceeded");
            return Err(AgentError::RateLimitExceeded {
                subject: subject.to_string(),
                limit,
                window_secs,
            });
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryStore;
    use crate::clock::ManualClock;
    use tokio_test::{assert_err, assert_ok};

    fn limiter() -> (RateLimiter, ManualClock) {
        // Window-aligned start: 1_699_999_980 is a multiple of 60.
        let clock = ManualClock::at_epoch_secs(1_699_999_980);
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(InMemoryStore::new(shared.clone()));
        (
            RateLimiter::new(store, shared, RateLimitPolicy::default()),
            clock,
        )
    }

    #[tokio::test]
    async fn test_sixth_call_in_window_is_rejected() {
        let (limiter, _clock) = limiter();

        for expected in 1..=5 {
            assert_eq!(limiter.check_with("u", 5, 60).await.unwrap(), expected);
        }

        let err = limiter.check_with("u", 5, 60).await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_new_window_admits_again() {
        let (limiter, clock) = limiter();

        for _ in 0..5 {
            assert_ok!(limiter.check("u").await);
        }
        assert_err!(limiter.check("u").await);

        clock.advance_secs(60);
        assert_eq!(limiter.check("u").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_subjects_are_counted_separately() {
        let (limiter, _clock) = limiter();

        for _ in 0..5 {
            assert_ok!(limiter.check("alice").await);
        }
        assert_err!(limiter.check("alice").await);
        assert_ok!(limiter.check("bob").await);
    }

    #[tokio::test]
    async fn test_boundary_burst_admits_twice_the_limit() {
        let (limiter, clock) = limiter();

        clock.advance_secs(59);
        for _ in 0..5 {
            assert_ok!(limiter.check("u").await);
        }
        clock.advance_secs(1);
        for _ in 0..5 {
            assert_ok!(limiter.check("u").await);
        }
        assert_err!(limiter.check("u").await);
    }

    #[tokio::test]
    async fn test_window_counter_expires_with_window() {
        let (limiter, clock) = limiter();
        assert_ok!(limiter.check("u").await);

        let key = format!("rate:u:{}", clock.now().timestamp() / 60);
        assert!(limiter.store.get(&key).await.unwrap().is_some());

        clock.advance_secs(60);
        assert!(limiter.store.get(&key).await.unwrap().is_none());
    }
}
