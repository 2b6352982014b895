//! Error types for cache operations.
//!
//! Every facade operation returns [`CacheError`]. Failures of the storage
//! engine, the Redis connection or its pool are grouped under
//! [`CacheError::Backend`] so callers can tell "the cache is broken" apart
//! from "the key is not there" or "the record is unreadable".

/// Error type for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The value could not be serialized into a cache record.
    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// The stored record is malformed, truncated, or does not hold the
    /// requested key with the requested type.
    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// The key is absent or has expired.
    #[error("Cache miss: {0}")]
    NotFound(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl CacheError {
    /// Returns `true` for the cache miss variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

/// Connection, transaction and I/O failures raised by a backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Redis pool configuration error: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    #[error("Storage engine error: {0}")]
    Storage(#[from] redb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

macro_rules! backend_error_from {
    ($($source:ty),+ $(,)?) => {
        $(
            impl From<$source> for CacheError {
                fn from(err: $source) -> Self {
                    CacheError::Backend(BackendError::from(err))
                }
            }
        )+
    };
}

backend_error_from!(
    redis::RedisError,
    deadpool_redis::PoolError,
    deadpool_redis::CreatePoolError,
    redb::Error,
    std::io::Error,
    tokio::task::JoinError,
);
