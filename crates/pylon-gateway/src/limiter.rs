//! Gateway rate limiting
//!
//! Two token buckets: a per-shard budget for outbound frames (the server
//! drops connections that exceed its frame window) and a single global
//! token spacing identify handshakes across the fleet. Acquisition waits
//! for the next free slot; there is no retry logic on top.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, DefaultKeyedRateLimiter, Quota, RateLimiter};

/// Fleet-wide send and identify pacing
pub struct GatewayRateLimiter {
    /// Outbound frame budget, keyed by shard id
    send: DefaultKeyedRateLimiter<u16>,
    /// Global identify spacing token
    identify: DefaultDirectRateLimiter,
}

impl GatewayRateLimiter {
    /// `outbound_rate` frames per 60 seconds per shard; one identify per
    /// `identify_delay` across all shards
    #[must_use]
    pub fn new(outbound_rate: u32, identify_delay: Duration) -> Self {
        let frames = NonZeroU32::new(outbound_rate.max(1)).expect("non-zero after max(1)");
        let send_quota = Quota::per_minute(frames);

        // A zero period would make the quota unrepresentable
        let period = identify_delay.max(Duration::from_millis(1));
        let identify_quota = Quota::with_period(period).expect("non-zero period");

        Self {
            send: RateLimiter::keyed(send_quota),
            identify: RateLimiter::direct(identify_quota),
        }
    }

    /// Wait for an outbound frame slot for this shard
    pub async fn acquire_send(&self, shard_id: u16) {
        self.send.until_key_ready(&shard_id).await;
    }

    /// Wait for the global identify token
    pub async fn acquire_identify(&self) {
        self.identify.until_ready().await;
    }

    /// Non-blocking probe of the send budget
    pub fn try_send(&self, shard_id: u16) -> bool {
        self.send.check_key(&shard_id).is_ok()
    }

    /// Non-blocking probe of the identify token
    pub fn try_identify(&self) -> bool {
        self.identify.check().is_ok()
    }
}

impl std::fmt::Debug for GatewayRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRateLimiter").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_budget_is_per_shard() {
        let limiter = GatewayRateLimiter::new(2, Duration::from_secs(5));

        assert!(limiter.try_send(0));
        assert!(limiter.try_send(0));
        assert!(!limiter.try_send(0), "third frame in the window must wait");

        // A different shard has its own bucket
        assert!(limiter.try_send(1));
    }

    #[test]
    fn test_identify_token_is_global() {
        let limiter = GatewayRateLimiter::new(120, Duration::from_secs(5));

        assert!(limiter.try_identify());
        assert!(!limiter.try_identify(), "second identify inside the window must wait");
    }

    #[tokio::test]
    async fn test_identify_token_replenishes() {
        let limiter = GatewayRateLimiter::new(120, Duration::from_millis(50));

        limiter.acquire_identify().await;
        assert!(!limiter.try_identify());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.try_identify());
    }

    #[tokio::test]
    async fn test_acquire_send_waits_for_slot() {
        let limiter = GatewayRateLimiter::new(1, Duration::from_secs(5));

        let start = std::time::Instant::now();
        limiter.acquire_send(0).await;
        assert!(start.elapsed() < Duration::from_millis(50), "first slot is free");
    }
}
