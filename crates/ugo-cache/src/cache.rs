//! The cache facade.
//!
//! [`Cache`] offers the same operations over either backend. The host picks
//! the variant once at construction time and passes the value around; there
//! is no global cache handle.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::embedded::EmbeddedCache;
use crate::error::CacheError;
use crate::remote::RemoteCache;

/// A cache instance backed by either the embedded store or Redis.
///
/// Cloning is cheap; clones share the underlying database handle or
/// connection pool.
#[derive(Clone, Debug)]
pub enum Cache {
    Embedded(EmbeddedCache),
    Remote(RemoteCache),
}

impl From<EmbeddedCache> for Cache {
    fn from(cache: EmbeddedCache) -> Self {
        Cache::Embedded(cache)
    }
}

impl From<RemoteCache> for Cache {
    fn from(cache: RemoteCache) -> Self {
        Cache::Remote(cache)
    }
}

impl Cache {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Cache::Embedded(_) => "embedded",
            Cache::Remote(_) => "redis",
        }
    }

    /// Gets the value stored under `key`.
    ///
    /// # Errors
    ///
    /// - `CacheError::NotFound` if the key is absent or expired
    /// - `CacheError::Decode` if the record is malformed or not a `T`
    /// - `CacheError::Backend` on connection or storage failure
    pub async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: DeserializeOwned,
    {
        match self {
            Cache::Embedded(cache) => cache.get(key).await,
            Cache::Remote(cache) => cache.get(key).await,
        }
    }

    /// Stores `value` under `key`, replacing whatever was there.
    ///
    /// With `ttl_seconds` greater than zero the entry expires at most that
    /// many seconds after the write; `None` or zero means no expiry.
    pub async fn set<T>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
    ) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        match self {
            Cache::Embedded(cache) => cache.set(key, value, ttl_seconds).await,
            Cache::Remote(cache) => cache.set(key, value, ttl_seconds).await,
        }
    }

    /// Returns `true` if [`get`](Self::get) would currently succeed for `key`.
    ///
    /// Every error is reported as `false`, including backend failures, which
    /// makes an unreachable cache indistinguishable from an empty one. Use
    /// [`try_has`](Self::try_has) when that difference matters.
    pub async fn has(&self, key: &str) -> bool {
        match self.try_has(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    cache.key = %key,
                    cache.backend = self.backend_name(),
                    error = %e,
                    "Cache lookup failed, reporting key as absent"
                );
                false
            }
        }
    }

    /// Like [`has`](Self::has), but only a cache miss becomes `Ok(false)`;
    /// decode and backend errors are returned.
    pub async fn try_has(&self, key: &str) -> Result<bool, CacheError> {
        match self.get::<Value>(key).await {
            Ok(_) => Ok(true),
            Err(CacheError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes `key`. Deleting an absent key is not an error.
    pub async fn forget(&self, key: &str) -> Result<(), CacheError> {
        match self {
            Cache::Embedded(cache) => cache.forget(key).await,
            Cache::Remote(cache) => cache.forget(key).await,
        }
    }

    /// Deletes every key owned by this instance: the whole store for the
    /// embedded backend, everything under `prefix:` for Redis.
    pub async fn empty(&self) -> Result<(), CacheError> {
        match self {
            Cache::Embedded(cache) => cache.empty().await,
            Cache::Remote(cache) => cache.empty().await,
        }
    }

    /// Deletes every key starting with `pattern` (a literal prefix, not a
    /// glob), scoped like [`empty`](Self::empty).
    ///
    /// Not atomic: on failure, keys deleted before the error stay deleted,
    /// and keys written concurrently may or may not survive.
    pub async fn empty_by_match(&self, pattern: &str) -> Result<(), CacheError> {
        match self {
            Cache::Embedded(cache) => cache.empty_by_match(pattern).await,
            Cache::Remote(cache) => cache.empty_by_match(pattern).await,
        }
    }
}
