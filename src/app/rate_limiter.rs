use anyhow::Result;
use rand::Rng;
use time::OffsetDateTime;

use crate::config::rate_limits::LimitClass;
use crate::infra::cache::RedisCache;

/// Outcome of recording one hit against a limiter class.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub limited: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Sorted-set member written for this hit; needed to refund it.
    pub member: String,
}

/// Sliding-window log per IP and class, kept as a Redis sorted set scored
/// by request time in milliseconds. A hit counts while its score is inside
/// the class window.
#[derive(Clone)]
pub struct RateLimiter {
    cache: RedisCache,
}

pub fn ip_key(ip: &str, class: LimitClass) -> String {
    format!("ratelimit:ip:{}:{}", class.as_str(), ip)
}

impl RateLimiter {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }

    /// Records a hit and reports whether it exceeded the quota. Rejected
    /// hits are removed again so they do not extend the lockout.
    pub async fn hit(&self, ip: &str, class: LimitClass) -> Result<RateLimitInfo> {
        let policy = class.policy();
        let key = ip_key(ip, class);
        let window_ms = policy.window.as_millis() as i64;
        let now_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let member = format!("{}-{:016x}", now_ms, rand::thread_rng().gen::<u64>());

        let count = self
            .cache
            .window_add(&key, &member, now_ms, window_ms)
            .await?;

        if count > policy.max_requests {
            self.cache.window_remove(&key, &member).await?;
            tracing::debug!(
                ip = ip,
                class = class.as_str(),
                count = count,
                limit = policy.max_requests,
                "rate limit exceeded"
            );
            return Ok(RateLimitInfo {
                limited: true,
                limit: policy.max_requests,
                remaining: 0,
                member,
            });
        }

        Ok(RateLimitInfo {
            limited: false,
            limit: policy.max_requests,
            remaining: policy.max_requests - count,
            member,
        })
    }

    /// Takes back a previously recorded hit.
    pub async fn refund(&self, ip: &str, class: LimitClass, member: &str) -> Result<()> {
        self.cache.window_remove(&ip_key(ip, class), member).await
    }
}
