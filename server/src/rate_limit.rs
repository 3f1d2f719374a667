use std::{
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
};
use tracing::{debug, instrument, warn};

use crate::config::Settings;

#[derive(Debug)]
pub struct TokenBucket {
    last_refill: Instant,
    tokens: u32,
    capacity: u32,
    refill_rate: u32,
    refill_interval: Duration,
}

impl TokenBucket {
    pub(crate) fn new(capacity: u32, refill_rate: u32, refill_interval: Duration) -> Self {
        debug!(
            "Creating new token bucket: capacity={}, refill_rate={}, interval={}s",
            capacity,
            refill_rate,
            refill_interval.as_secs()
        );
        Self {
            last_refill: Instant::now(),
            tokens: capacity,
            capacity,
            refill_rate,
            refill_interval,
        }
    }

    fn try_consume(&mut self) -> bool {
        self.refill(Instant::now());
        if self.tokens > 0 {
            self.tokens -= 1;
            debug!("Token consumed, remaining: {}", self.tokens);
            true
        } else {
            debug!("No tokens available for consumption");
            false
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill);
        let intervals = elapsed.as_secs() / self.refill_interval.as_secs().max(1);

        if intervals > 0 {
            let old_tokens = self.tokens;
            let tokens_to_add = (intervals as u32).saturating_mul(self.refill_rate);
            self.tokens = self.tokens.saturating_add(tokens_to_add).min(self.capacity);
            self.last_refill = now;
            if self.tokens != old_tokens {
                debug!(
                    "Token bucket refilled: {} -> {} tokens",
                    old_tokens, self.tokens
                );
            }
        }
    }

    /// Whether the bucket is full again as of `now`, so dropping it loses nothing.
    pub(crate) fn is_idle(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.tokens >= self.capacity
    }
}

pub type RateLimiter = Arc<DashMap<IpAddr, TokenBucket>>;

pub fn create_rate_limiter() -> RateLimiter {
    Arc::new(DashMap::new())
}

#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub IpAddr);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let trust_proxy_headers = req
            .rocket()
            .state::<Settings>()
            .is_some_and(|settings| settings.trust_proxy_headers);

        let ip = if trust_proxy_headers {
            forwarded_ip(req).or_else(|| req.client_ip())
        } else {
            // client_ip() would still honour X-Real-IP
            req.remote().map(|addr| addr.ip())
        };

        request::Outcome::Success(ClientIp(
            ip.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        ))
    }
}

fn forwarded_ip(req: &Request<'_>) -> Option<IpAddr> {
    req.headers()
        .get_one("X-Forwarded-For")
        .and_then(|header| header.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
        .or_else(|| {
            req.headers()
                .get_one("X-Real-IP")
                .and_then(|ip| ip.trim().parse().ok())
        })
}

/// Takes one game from `ip`'s bucket, which refills to `games_per_minute`
/// every minute.
#[instrument(level = "trace", skip(rate_limiter))]
pub fn check_rate_limit(
    rate_limiter: &RateLimiter,
    ip: &IpAddr,
    games_per_minute: u32,
) -> Result<(), Status> {
    let refill_interval = Duration::from_secs(60);

    let mut entry = rate_limiter
        .entry(*ip)
        .or_insert_with(|| TokenBucket::new(games_per_minute, games_per_minute, refill_interval));

    if entry.try_consume() {
        debug!("Rate limit check passed for {}", ip);
        Ok(())
    } else {
        warn!("Rate limit exceeded for {} - rejecting game", ip);
        Err(Status::TooManyRequests)
    }
}

/// One client's game budget, kept by its socket so that restarts draw from
/// the same bucket as new connections.
#[derive(Debug, Clone)]
pub struct GameQuota {
    rate_limiter: RateLimiter,
    ip: IpAddr,
    games_per_minute: u32,
}

impl GameQuota {
    pub fn new(rate_limiter: RateLimiter, ip: IpAddr, games_per_minute: u32) -> Self {
        Self {
            rate_limiter,
            ip,
            games_per_minute,
        }
    }

    /// Takes one game, or `429` when the budget is spent.
    pub fn take(&self) -> Result<(), Status> {
        check_rate_limit(&self.rate_limiter, &self.ip, self.games_per_minute)
    }
}
