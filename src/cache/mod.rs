//! Key-value cache for catalog listings and timetables.
//!
//! Values are stored as JSON bytes. Listings live under `"<category_type>"`,
//! timetables under `"<category_type>.<identity>"`.

mod memory;
mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppResult;
use crate::models::CategoryType;

pub use self::memory::MemoryCache;
pub use self::redis_cache::RedisCache;

/// Minimal store contract: opaque bytes with an optional time to live.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;

    /// Store `value`, replacing any previous entry. `None` means no expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> AppResult<()>;
}

pub struct CacheKey;

impl CacheKey {
    pub fn category(category_type: CategoryType) -> String {
        category_type.as_str().to_string()
    }

    pub fn timetable(category_type: CategoryType, identity: &str) -> String {
        format!("{}.{}", category_type.as_str(), identity)
    }
}

/// Typed access on top of [`CacheStore`].
///
/// The cache is an optimisation only: store failures and undecodable entries
/// are logged and reported as a miss, and failed writes are dropped.
#[async_trait]
pub trait CacheExt {
    async fn get_json<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned + Send;

    async fn set_json<T>(&self, key: &str, value: &T, ttl: Option<Duration>)
    where
        T: Serialize + Sync;
}

#[async_trait]
impl<S> CacheExt for S
where
    S: CacheStore + ?Sized,
{
    async fn get_json<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned + Send,
    {
        let bytes = match self.get(key).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                tracing::warn!("Cache read for '{}' failed: {}", key, e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding undecodable cache entry '{}': {}", key, e);
                None
            }
        }
    }

    async fn set_json<T>(&self, key: &str, value: &T, ttl: Option<Duration>)
    where
        T: Serialize + Sync,
    {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Could not encode cache entry '{}': {}", key, e);
                return;
            }
        };

        if let Err(e) = self.set(key, bytes, ttl).await {
            tracing::warn!("Cache write for '{}' failed: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    #[test]
    fn keys_follow_namespace_scheme() {
        assert_eq!(CacheKey::category(CategoryType::Module), "module");
        assert_eq!(
            CacheKey::timetable(CategoryType::Location, "abc-123"),
            "location.abc-123"
        );
    }

    #[tokio::test]
    async fn json_round_trip_through_store() {
        let cache = MemoryCache::new();
        let category = Category {
            items: Vec::new(),
            count: 7,
        };

        cache.set_json("course", &category, None).await;
        let cached: Option<Category> = cache.get_json("course").await;
        assert_eq!(cached, Some(category));
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let cache = MemoryCache::new();
        cache.set("course", b"not json".to_vec(), None).await.unwrap();

        let cached: Option<Category> = cache.get_json("course").await;
        assert!(cached.is_none());
    }
}
