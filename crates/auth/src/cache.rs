//! Session cache capability trait and in-process implementation.
//!
//! The cache holds two kinds of short-lived records, each under a fixed key
//! prefix:
//!
//! - `refresh_token:<user-id>` - the single currently-valid refresh token
//!   for a user (local sessions) or the stored Google refresh token
//! - `oauth_state:<state>` - anti-forgery state for an in-flight OAuth
//!   authorization, value is a fixed sentinel
//!
//! Expiry is the cache's job; the auth service owns no timers.

use std::time::Duration;

use async_trait::async_trait;
use blue_papaya_core::UserId;
use moka::Expiry;
use moka::future::Cache;
use thiserror::Error;

/// Key prefix for refresh-token records.
pub const REFRESH_TOKEN_PREFIX: &str = "refresh_token:";

/// Key prefix for OAuth anti-forgery state records.
pub const OAUTH_STATE_PREFIX: &str = "oauth_state:";

/// Sentinel value stored for a valid OAuth state.
pub const OAUTH_STATE_VALID: &str = "valid";

/// Cache key for a user's refresh-token record.
#[must_use]
pub fn refresh_token_key(user_id: UserId) -> String {
    format!("{REFRESH_TOKEN_PREFIX}{user_id}")
}

/// Cache key for an OAuth state record.
#[must_use]
pub fn oauth_state_key(state: &str) -> String {
    format!("{OAUTH_STATE_PREFIX}{state}")
}

/// Errors from the session cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store is unreachable or rejected the operation.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Key/value storage with per-entry TTL.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Get the value for a key, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set a value with a time-to-live, replacing any prior value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process session cache backed by `moka`.
///
/// Each entry carries its own TTL; refresh-token records live for the
/// refresh lifetime while OAuth state lives ten minutes.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Cache<String, Entry>,
}

impl MemoryCache {
    /// Create a cache with room for `capacity` entries.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl SessionCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.inner.get(key).await.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.inner
            .insert(
                key.to_owned(),
                Entry {
                    value: value.to_owned(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefixes() {
        let id = UserId::generate();
        assert_eq!(refresh_token_key(id), format!("refresh_token:{id}"));
        assert_eq!(oauth_state_key("abc123"), "oauth_state:abc123");
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new(16);
        cache
            .set("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);

        // Deleting an absent key is fine.
        cache.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_set_replaces_prior_value() {
        let cache = MemoryCache::new(16);
        cache
            .set("k", "old", Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set("k", "new", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let cache = MemoryCache::new(16);
        cache
            .set("k", "v", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
