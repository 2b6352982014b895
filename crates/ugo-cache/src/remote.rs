//! Redis cache client for distributed caching.
//!
//! Every key is namespaced as `prefix:key` before it reaches Redis, and the
//! stored record is keyed by that namespaced form. Connections come from a
//! deadpool pool; a checked-out connection goes back to the pool when it is
//! dropped, whichever way the operation returns.

use std::collections::BTreeSet;
use std::fmt;

use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::codec::{decode_value, encode_value};
use crate::config::RemoteCacheConfig;
use crate::error::CacheError;

/// Hint passed to `SCAN ... COUNT`.
const SCAN_COUNT: usize = 100;

/// Redis cache client with connection pooling.
#[derive(Clone)]
pub struct RemoteCache {
    pool: Pool,
    prefix: String,
}

impl fmt::Debug for RemoteCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCache")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RemoteCache {
    /// Creates a Redis cache client from configuration.
    ///
    /// No connection is opened until the first operation.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Backend` if the pool cannot be built from the
    /// configured URL.
    pub fn new(config: &RemoteCacheConfig) -> Result<Self, CacheError> {
        let mut pool_config = Config::from_url(config.redis_url.as_str());
        pool_config.pool = Some(PoolConfig::new(config.pool_size));
        let pool = pool_config.create_pool(Some(Runtime::Tokio1))?;

        Ok(Self::from_pool(pool, config.key_prefix.as_str()))
    }

    /// Wraps an existing pool. Keys are namespaced with `prefix`.
    pub fn from_pool(pool: Pool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Storage key for `key` in this instance's namespace.
    pub fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    async fn connection(&self) -> Result<Connection, CacheError> {
        Ok(self.pool.get().await?)
    }

    /// Gets a cached value by key.
    ///
    /// # Errors
    ///
    /// `CacheError::NotFound` if the key is absent or expired,
    /// `CacheError::Decode` if the record cannot be read as `T`.
    #[instrument(skip(self), fields(cache.backend = "redis", cache.operation = "GET"))]
    pub async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: DeserializeOwned,
    {
        let key = self.key(key);
        let mut conn = self.connection().await?;

        let raw: Option<Vec<u8>> = conn.get(&key).await?;

        match raw {
            Some(bytes) => {
                debug!(cache.key = %key, "Cache hit");
                decode_value(&key, &bytes)
            }
            None => {
                debug!(cache.key = %key, "Cache miss");
                Err(CacheError::NotFound(key))
            }
        }
    }

    /// Stores `value` under `key`, replacing any previous record.
    ///
    /// Uses `SETEX` when `ttl_seconds` is greater than zero, plain `SET`
    /// otherwise.
    #[instrument(skip(self, value), fields(cache.backend = "redis", cache.operation = "SET"))]
    pub async fn set<T>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
    ) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let key = self.key(key);
        let bytes = encode_value(&key, value)?;
        let mut conn = self.connection().await?;

        match ttl_seconds.filter(|ttl| *ttl > 0) {
            Some(ttl) => conn.set_ex::<_, _, ()>(&key, bytes, ttl).await?,
            None => conn.set::<_, _, ()>(&key, bytes).await?,
        }

        debug!(cache.key = %key, cache.ttl_secs = ?ttl_seconds, "Cache set");

        Ok(())
    }

    /// Deletes `key`. Deleting an absent key succeeds.
    #[instrument(skip(self), fields(cache.backend = "redis", cache.operation = "DEL"))]
    pub async fn forget(&self, key: &str) -> Result<(), CacheError> {
        let key = self.key(key);
        let mut conn = self.connection().await?;

        conn.del::<_, ()>(&key).await?;

        debug!(cache.key = %key, "Cache invalidated");

        Ok(())
    }

    /// Deletes every key in this instance's namespace.
    ///
    /// Keys belonging to other prefixes are not touched.
    pub async fn empty(&self) -> Result<(), CacheError> {
        self.empty_by_match("").await
    }

    /// Deletes every key in this namespace that starts with `pattern`.
    ///
    /// `pattern` is matched literally; glob characters in it are escaped.
    /// Matching keys are collected with `SCAN` and then deleted one by one.
    /// Neither step is atomic with respect to concurrent writers, and a
    /// failed `DEL` aborts the call after earlier deletions have taken
    /// effect.
    #[instrument(skip(self), fields(cache.backend = "redis", cache.operation = "SCAN_DEL"))]
    pub async fn empty_by_match(&self, pattern: &str) -> Result<(), CacheError> {
        let pattern = format!("{}*", escape_pattern(&self.key(pattern)));
        let mut conn = self.connection().await?;

        let keys = scan_keys(&mut conn, &pattern).await?;
        for key in &keys {
            conn.del::<_, ()>(key).await?;
        }

        debug!(cache.pattern = %pattern, cache.deleted = %keys.len(), "Pattern invalidation complete");

        Ok(())
    }

    /// Round trip to the server, for readiness checks.
    #[instrument(skip(self), fields(cache.backend = "redis", cache.operation = "PING"))]
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Closes the pool; later operations fail with a pool error.
    pub fn close(&self) {
        self.pool.close();
    }
}

/// Collects every key matching `pattern`, following the cursor until the
/// server reports it exhausted. Duplicate keys across pages are folded.
async fn scan_keys(conn: &mut Connection, pattern: &str) -> Result<BTreeSet<String>, CacheError> {
    let mut cursor: u64 = 0;
    let mut keys = BTreeSet::new();

    loop {
        let (next_cursor, page): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_COUNT)
            .query_async(conn)
            .await?;

        keys.extend(page);

        cursor = next_cursor;
        if cursor == 0 {
            break;
        }
    }

    Ok(keys)
}

/// Escapes Redis glob metacharacters so `input` matches only itself.
pub fn escape_pattern(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        id: i32,
        name: String,
    }

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into())
    }

    fn test_cache() -> RemoteCache {
        let config = RemoteCacheConfig {
            redis_url: redis_url(),
            key_prefix: format!("test-ugo-{}", uuid::Uuid::new_v4()),
            pool_size: 4,
        };
        RemoteCache::new(&config).unwrap()
    }

    #[test]
    fn test_key_is_prefixed() {
        let pool = Config::from_url("redis://127.0.0.1:6379")
            .create_pool(Some(Runtime::Tokio1))
            .unwrap();
        let cache = RemoteCache::from_pool(pool, "test-ug");

        assert_eq!(cache.key("foo"), "test-ug:foo");
        assert_eq!(cache.prefix(), "test-ug");
    }

    #[test]
    fn test_escape_pattern() {
        assert_eq!(escape_pattern("plain:key"), "plain:key");
        assert_eq!(escape_pattern("a*b"), "a\\*b");
        assert_eq!(escape_pattern("q?[x]"), "q\\?\\[x\\]");
        assert_eq!(escape_pattern("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_invalid_url_is_backend_error() {
        let config = RemoteCacheConfig {
            redis_url: "not a url".into(),
            key_prefix: "test".into(),
            pool_size: 1,
        };

        let result = RemoteCache::new(&config);

        assert!(matches!(result, Err(CacheError::Backend(_))));
    }

    // Integration tests require a running Redis instance

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_set_and_get() {
        let cache = test_cache();
        let data = TestData {
            id: 1,
            name: "test".to_string(),
        };

        cache.set("test:key", &data, None).await.unwrap();

        let retrieved: TestData = cache.get("test:key").await.unwrap();
        assert_eq!(retrieved, data);

        cache.empty().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_record_is_keyed_by_prefixed_key() {
        let cache = test_cache();
        cache.set("foo", "bar", None).await.unwrap();

        let mut conn = cache.connection().await.unwrap();
        let raw: Vec<u8> = conn.get(cache.key("foo")).await.unwrap();
        let value: String = decode_value(&cache.key("foo"), &raw).unwrap();
        assert_eq!(value, "bar");

        cache.empty().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_ttl_expires() {
        let cache = test_cache();

        cache.set("foo", "bar", Some(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        let result: Result<String, _> = cache.get("foo").await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_empty_by_match_is_literal_prefix() {
        let cache = test_cache();

        cache.set("a*", "star", None).await.unwrap();
        cache.set("ab", "plain", None).await.unwrap();

        cache.empty_by_match("a*").await.unwrap();

        let gone: Result<String, _> = cache.get("a*").await;
        assert!(gone.unwrap_err().is_not_found());
        let kept: String = cache.get("ab").await.unwrap();
        assert_eq!(kept, "plain");

        cache.empty().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_empty_leaves_other_prefixes() {
        let first = test_cache();
        let second = test_cache();

        first.set("foo", "one", None).await.unwrap();
        second.set("foo", "two", None).await.unwrap();

        first.empty().await.unwrap();

        let gone: Result<String, _> = first.get("foo").await;
        assert!(gone.unwrap_err().is_not_found());
        let kept: String = second.get("foo").await.unwrap();
        assert_eq!(kept, "two");

        second.empty().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_ping() {
        test_cache().ping().await.unwrap();
    }
}
