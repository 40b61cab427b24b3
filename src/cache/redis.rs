//! Redis cache backend (`redis-cache` feature)
//!
//! Every key is stored under a `folio:` namespace so `clear` and
//! `delete_pattern` never touch keys owned by other applications sharing
//! the database. Pattern deletes use SCAN, never KEYS.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

const NAMESPACE: &str = "folio:";

const SCAN_COUNT: usize = 100;

pub struct RedisCache {
    connection: MultiplexedConnection,
    /// Upper bound on entry lifetime
    max_ttl: Duration,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("max_ttl", &self.max_ttl)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    pub async fn with_ttl(redis_url: &str, max_ttl: Duration) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self { connection, max_ttl })
    }

    fn namespaced(key: &str) -> String {
        format!("{}{}", NAMESPACE, key)
    }

    async fn delete_matching(&self, redis_pattern: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(redis_pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .context("Failed to scan keys in Redis")?;

            if !keys.is_empty() {
                let _: () = conn
                    .del(&keys)
                    .await
                    .context("Failed to delete keys from Redis")?;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CacheLayer for RedisCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection.clone();
        let json: Option<String> = conn
            .get(Self::namespaced(key))
            .await
            .context("Failed to get value from Redis")?;

        json.map(|j| serde_json::from_str(&j).context("Failed to deserialize cached value"))
            .transpose()
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        let ttl_secs = ttl.min(self.max_ttl).as_secs().max(1);

        let _: () = conn
            .set_ex(Self::namespaced(key), json, ttl_secs)
            .await
            .context("Failed to set value in Redis")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(Self::namespaced(key))
            .await
            .context("Failed to delete key from Redis")?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        // Redis MATCH already speaks `*` and `?`
        self.delete_matching(&Self::namespaced(pattern)).await
    }

    async fn clear(&self) -> Result<()> {
        self.delete_matching(&format!("{}*", NAMESPACE)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[test]
    fn test_keys_are_namespaced() {
        assert_eq!(RedisCache::namespaced("post:hello"), "folio:post:hello");
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_set_get_delete() {
        let cache = RedisCache::with_ttl(&redis_url(), Duration::from_secs(60))
            .await
            .unwrap();

        cache
            .set("test:key", &"value".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let got: Option<String> = cache.get("test:key").await.unwrap();
        assert_eq!(got.as_deref(), Some("value"));

        cache.delete("test:key").await.unwrap();
        let got: Option<String> = cache.get("test:key").await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_delete_pattern() {
        let cache = RedisCache::with_ttl(&redis_url(), Duration::from_secs(60))
            .await
            .unwrap();
        let ttl = Duration::from_secs(60);
        cache.set("test:posts:1", &1, ttl).await.unwrap();
        cache.set("test:posts:2", &2, ttl).await.unwrap();
        cache.set("test:projects:1", &3, ttl).await.unwrap();

        cache.delete_pattern("test:posts:*").await.unwrap();

        let a: Option<i32> = cache.get("test:posts:1").await.unwrap();
        let c: Option<i32> = cache.get("test:projects:1").await.unwrap();
        assert!(a.is_none());
        assert_eq!(c, Some(3));
        cache.delete("test:projects:1").await.unwrap();
    }
}
