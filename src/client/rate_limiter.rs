//! Per-provider rate limiting.
//!
//! One token bucket per provider, owned by the orchestration context and
//! passed into adapter calls through `CollectContext`. Adapters never keep
//! their own timing state, which keeps limiting correct under concurrent
//! fan-out across many identifiers and makes it testable.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug)]
struct Bucket {
    /// Minimum interval between requests.
    interval: Duration,
    /// Earliest moment the next request may start.
    next_allowed: Instant,
    /// Provider-wide backoff deadline after a 429.
    penalty_until: Option<Instant>,
}

/// Shared token-bucket limiter keyed by provider name.
///
/// `acquire` reserves a slot under the lock and sleeps outside it, so
/// concurrent callers serialize their start times without holding the map
/// for the duration of the wait.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    default_interval: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(default_interval: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            default_interval,
        }
    }

    /// Register a provider with its minimum inter-request interval.
    /// Unregistered providers fall back to the default interval.
    pub async fn register(&self, provider: &str, interval: Duration) {
        let mut buckets = self.buckets.lock().await;
        buckets.insert(
            provider.to_string(),
            Bucket {
                interval,
                next_allowed: Instant::now(),
                penalty_until: None,
            },
        );
    }

    /// Wait until a request to `provider` is allowed, then reserve the slot.
    pub async fn acquire(&self, provider: &str) {
        let wait = {
            let mut buckets = self.buckets.lock().await;
            let default_interval = self.default_interval;
            let bucket = buckets
                .entry(provider.to_string())
                .or_insert_with(|| Bucket {
                    interval: default_interval,
                    next_allowed: Instant::now(),
                    penalty_until: None,
                });

            let now = Instant::now();
            let mut start = bucket.next_allowed.max(now);
            if let Some(penalty) = bucket.penalty_until {
                if penalty > start {
                    start = penalty;
                }
                if penalty <= now {
                    bucket.penalty_until = None;
                }
            }
            bucket.next_allowed = start + bucket.interval;
            start.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            debug!(provider, wait_ms = wait.as_millis() as u64, "rate limit wait");
            tokio::time::sleep(wait).await;
        }
    }

    /// Apply a provider-wide backoff. Used when a provider answers 429:
    /// the penalty throttles every in-flight task targeting that provider,
    /// not just the request that observed it.
    pub async fn penalize(&self, provider: &str, backoff: Duration) {
        let mut buckets = self.buckets.lock().await;
        let default_interval = self.default_interval;
        let bucket = buckets
            .entry(provider.to_string())
            .or_insert_with(|| Bucket {
                interval: default_interval,
                next_allowed: Instant::now(),
                penalty_until: None,
            });
        let until = Instant::now() + backoff;
        bucket.penalty_until = Some(bucket.penalty_until.map_or(until, |p| p.max(until)));
        warn!(
            provider,
            backoff_ms = backoff.as_millis() as u64,
            "provider-wide rate-limit backoff applied"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_acquire_spaces_requests_by_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        limiter
            .register("unpaywall", Duration::from_millis(200))
            .await;

        let start = Instant::now();
        limiter.acquire("unpaywall").await;
        limiter.acquire("unpaywall").await;
        limiter.acquire("unpaywall").await;
        let elapsed = start.elapsed();

        // Second and third acquires wait one interval each.
        assert!(elapsed >= Duration::from_millis(400), "elapsed: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_provider_uses_default_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(50));

        let start = Instant::now();
        limiter.acquire("mystery").await;
        limiter.acquire("mystery").await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_providers_do_not_block_each_other() {
        let limiter = RateLimiter::new(Duration::from_secs(10));

        let start = Instant::now();
        limiter.acquire("a").await;
        limiter.acquire("b").await;
        limiter.acquire("c").await;
        // First acquire per provider is free.
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_penalty_delays_next_acquire() {
        let limiter = RateLimiter::new(Duration::from_millis(10));
        limiter.acquire("core").await;
        limiter.penalize("core", Duration::from_secs(5)).await;

        let start = Instant::now();
        limiter.acquire("core").await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
