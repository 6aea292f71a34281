//! Fixed-window request quotas.
//!
//! A [`RateLimitPolicy`] says how many requests a client may make per window; a
//! [`RateLimitStore`] counts them. The in-process store keeps one entry per key in a
//! sharded map and updates it under the shard lock, so concurrent requests for the same
//! key can never race past `max`. The Redis store does the same with a Lua script and
//! is shared by every instance.

use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use redis::{Script, aio::ConnectionManager};

use super::InfraError;
use crate::app_error::{AppError, AppResult};

/// Header carrying the caller's user id, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later.";
pub const AUTH_MESSAGE: &str = "Too many authentication attempts, please try again later.";

/// Derives the client part of a rate-limit key from request headers and the peer address.
pub type KeyGenerator = fn(&HeaderMap, Option<SocketAddr>) -> String;

#[derive(Clone, Debug)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max: u64,
    pub message: &'static str,
    pub key_generator: KeyGenerator,
}

impl RateLimitPolicy {
    pub fn new(window: Duration, max: u64) -> Self {
        Self {
            window,
            max,
            message: DEFAULT_MESSAGE,
            key_generator: client_key,
        }
    }

    pub fn with_message(mut self, message: &'static str) -> Self {
        self.message = message;
        self
    }

    pub fn with_key_generator(mut self, key_generator: KeyGenerator) -> Self {
        self.key_generator = key_generator;
        self
    }

    /// 60 requests per minute.
    pub fn default_policy() -> Self {
        Self::new(Duration::from_secs(60), 60)
    }

    /// 5 attempts per 15 minutes.
    pub fn auth() -> Self {
        Self::new(Duration::from_secs(15 * 60), 5).with_message(AUTH_MESSAGE)
    }

    /// 100 requests per minute.
    pub fn api() -> Self {
        Self::new(Duration::from_secs(60), 100)
    }

    /// 20 requests per minute.
    pub fn stripe() -> Self {
        Self::new(Duration::from_secs(60), 20)
    }

    fn window_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.window).unwrap_or(TimeDelta::MAX)
    }
}

/// Default key generator: `user:<id>` for identified callers, else `ip:<address>`.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(user_id) = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return format!("user:{user_id}");
    }

    let ip = forwarded_ip(headers)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());
    format!("ip:{ip}")
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    // Extract IP from X-Forwarded-For or X-Real-IP headers
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(first) = val.split(',').next()
    {
        let trimmed = first.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    if let Some(real) = headers.get("x-real-ip")
        && let Ok(val) = real.to_str()
        && !val.trim().is_empty()
    {
        return Some(val.trim().to_string());
    }
    None
}

/// Quota state reported back to the client in response headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    pub retry_after_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed(RateLimitInfo),
    Limited(RateLimitInfo),
}

impl RateLimitDecision {
    /// Decide from the post-increment count of the current window.
    pub fn from_count(
        policy: &RateLimitPolicy,
        count: u64,
        reset_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let millis = (reset_at - now).num_milliseconds().max(0) as u64;
        let retry_after_secs = millis.div_ceil(1000);

        if count > policy.max {
            RateLimitDecision::Limited(RateLimitInfo {
                limit: policy.max,
                remaining: 0,
                reset_at,
                retry_after_secs: retry_after_secs.max(1),
            })
        } else {
            RateLimitDecision::Allowed(RateLimitInfo {
                limit: policy.max,
                remaining: policy.max - count,
                reset_at,
                retry_after_secs,
            })
        }
    }

    pub fn info(&self) -> &RateLimitInfo {
        match self {
            RateLimitDecision::Allowed(info) | RateLimitDecision::Limited(info) => info,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed(_))
    }
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request against `key` and decide whether it may proceed.
    async fn check_and_increment(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> AppResult<RateLimitDecision>;

    /// Drop windows that have already expired. Returns how many were removed.
    async fn sweep_expired(&self) -> usize;
}

// ============================================================================
// In-process store
// ============================================================================

#[derive(Clone, Copy, Debug)]
struct WindowEntry {
    count: u64,
    reset_at: DateTime<Utc>,
}

/// Single-process store. Counts are lost on restart and not shared between instances.
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    entries: DashMap<String, WindowEntry>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// [`RateLimitStore::check_and_increment`] at an explicit instant.
    pub fn check_at(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let window = policy.window_delta();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                reset_at: now + window,
            });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }
        entry.count += 1;
        let WindowEntry { count, reset_at } = *entry;
        drop(entry);

        RateLimitDecision::from_count(policy, count, reset_at, now)
    }

    /// [`RateLimitStore::sweep_expired`] at an explicit instant.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let live = entry.reset_at > now;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> AppResult<RateLimitDecision> {
        Ok(self.check_at(key, policy, Utc::now()))
    }

    async fn sweep_expired(&self) -> usize {
        self.sweep_at(Utc::now())
    }
}

// ============================================================================
// Redis store
// ============================================================================

/// Atomic increment that starts the window on the first hit.
/// Returns `{count, remaining ttl in ms}`.
/// A key left without a TTL gets one, so it can never block a client forever.
const INCR_WITH_PTTL_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 or redis.call('PTTL', KEYS[1]) < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return {current, redis.call('PTTL', KEYS[1])}
"#;

/// Store shared by all instances. Expiry is handled by Redis.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    manager: ConnectionManager,
    script: Script,
}

impl RedisRateLimitStore {
    pub async fn new(redis_url: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url).map_err(InfraError::RedisConnection)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(InfraError::RedisConnection)?;
        Ok(Self {
            manager,
            script: Script::new(INCR_WITH_PTTL_SCRIPT),
        })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> AppResult<RateLimitDecision> {
        let mut conn = self.manager.clone();
        let window_ms = policy.window.as_millis() as u64;
        let (count, pttl): (u64, i64) = self
            .script
            .key(format!("rate:{key}"))
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let now = Utc::now();
        let ttl_ms = if pttl > 0 { pttl } else { window_ms as i64 };
        let reset_at = now + TimeDelta::milliseconds(ttl_ms);
        Ok(RateLimitDecision::from_count(policy, count, reset_at, now))
    }

    async fn sweep_expired(&self) -> usize {
        0
    }
}
