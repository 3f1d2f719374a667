use std::time::{Duration, Instant};

use tokio::time;
use tracing::{debug, info};

use crate::rate_limit::RateLimiter;

pub async fn start_cleanup_task(rate_limiter: RateLimiter, cleanup_interval: Duration) {
    let mut interval = time::interval(cleanup_interval);

    info!(
        "Started rate limit cleanup task: checking every {}s",
        cleanup_interval.as_secs()
    );

    loop {
        interval.tick().await;
        cleanup_buckets(&rate_limiter, Instant::now());
    }
}

/// Drops every bucket that has refilled completely. Returns how many went.
pub fn cleanup_buckets(rate_limiter: &RateLimiter, now: Instant) -> usize {
    let before = rate_limiter.len();
    rate_limiter.retain(|_, bucket| !bucket.is_idle(now));
    let removed_count = before.saturating_sub(rate_limiter.len());

    if removed_count > 0 {
        info!("Cleaned up {} idle rate limit buckets", removed_count);
    } else {
        debug!("No idle rate limit buckets");
    }
    removed_count
}
