//! Cache configuration.
//!
//! This module selects the cache backend and its connection settings from
//! environment variables.

use std::env;
use std::path::PathBuf;

use crate::embedded::DEFAULT_BATCH_SIZE;

/// Which backend the host should build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheBackend {
    /// No cache configured.
    #[default]
    Disabled,
    /// Local redb store.
    Embedded,
    /// Remote Redis service.
    Remote,
}

impl CacheBackend {
    /// Parses the `CACHE` setting. Unknown values disable the cache.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Self::Remote,
            "badger" | "embedded" | "redb" => Self::Embedded,
            _ => Self::Disabled,
        }
    }
}

/// Redis connection settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCacheConfig {
    /// Redis connection URL, credentials included.
    pub redis_url: String,

    /// Namespace prepended to every key as `prefix:key`.
    pub key_prefix: String,

    /// Maximum number of pooled connections.
    pub pool_size: usize,
}

impl Default for RemoteCacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".into(),
            key_prefix: "ugo".into(),
            pool_size: 50,
        }
    }
}

/// Embedded store settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddedCacheConfig {
    /// Directory owned by the storage engine.
    pub directory: PathBuf,

    /// Keys deleted per write transaction by bulk eviction.
    pub batch_size: usize,
}

impl Default for EmbeddedCacheConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./tmp/badger"),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Cache configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `CACHE`: `redis`, `badger` (or `embedded`), anything else disables caching
/// - `REDIS_URL`: full Redis URL; when unset it is built from `REDIS_HOST`
///   (default: `127.0.0.1:6379`) and `REDIS_PASSWORD`
/// - `REDIS_PREFIX`: key namespace for the Redis backend (default: `ugo`)
/// - `REDIS_POOL_SIZE`: maximum pooled connections (default: `50`)
/// - `CACHE_DIR`: embedded store directory (default: `./tmp/badger`)
/// - `CACHE_BATCH_SIZE`: keys per delete batch (default: `100000`)
/// - `CACHE_SWEEP_INTERVAL_SECONDS`: expired-entry sweep period for the
///   embedded store (default: `86400`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub remote: RemoteCacheConfig,
    pub embedded: EmbeddedCacheConfig,
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Disabled,
            remote: RemoteCacheConfig::default(),
            embedded: EmbeddedCacheConfig::default(),
            sweep_interval_seconds: 86_400,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |name: &str| -> Option<usize> {
            lookup(name).and_then(|v| v.trim().parse().ok())
        };

        let redis_url = lookup("REDIS_URL")
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| {
                let host = lookup("REDIS_HOST")
                    .filter(|host| !host.is_empty())
                    .unwrap_or_else(|| "127.0.0.1:6379".into());
                match lookup("REDIS_PASSWORD").filter(|password| !password.is_empty()) {
                    Some(password) => format!("redis://:{password}@{host}"),
                    None => format!("redis://{host}"),
                }
            });

        Self {
            backend: lookup("CACHE")
                .map(|value| CacheBackend::parse(&value))
                .unwrap_or_default(),
            remote: RemoteCacheConfig {
                redis_url,
                key_prefix: lookup("REDIS_PREFIX").unwrap_or(defaults.remote.key_prefix),
                pool_size: parsed("REDIS_POOL_SIZE")
                    .filter(|size| *size > 0)
                    .unwrap_or(defaults.remote.pool_size),
            },
            embedded: EmbeddedCacheConfig {
                directory: lookup("CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.embedded.directory),
                batch_size: parsed("CACHE_BATCH_SIZE")
                    .filter(|size| *size > 0)
                    .unwrap_or(defaults.embedded.batch_size),
            },
            sweep_interval_seconds: lookup("CACHE_SWEEP_INTERVAL_SECONDS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.sweep_interval_seconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> CacheConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CacheConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);

        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.backend, CacheBackend::Disabled);
        assert_eq!(config.remote.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.embedded.batch_size, 100_000);
    }

    #[test]
    fn test_backend_selection() {
        assert_eq!(CacheBackend::parse("redis"), CacheBackend::Remote);
        assert_eq!(CacheBackend::parse("badger"), CacheBackend::Embedded);
        assert_eq!(CacheBackend::parse(" Embedded "), CacheBackend::Embedded);
        assert_eq!(CacheBackend::parse("memcached"), CacheBackend::Disabled);
        assert_eq!(CacheBackend::parse(""), CacheBackend::Disabled);
    }

    #[test]
    fn test_redis_url_from_host_and_password() {
        let config = config_from(&[
            ("CACHE", "redis"),
            ("REDIS_HOST", "cache.internal:6380"),
            ("REDIS_PASSWORD", "s3cret"),
            ("REDIS_PREFIX", "myapp"),
        ]);

        assert_eq!(config.backend, CacheBackend::Remote);
        assert_eq!(config.remote.redis_url, "redis://:s3cret@cache.internal:6380");
        assert_eq!(config.remote.key_prefix, "myapp");
    }

    #[test]
    fn test_redis_url_takes_precedence() {
        let config = config_from(&[
            ("REDIS_URL", "redis://10.0.0.1:6379/2"),
            ("REDIS_HOST", "ignored:6379"),
        ]);

        assert_eq!(config.remote.redis_url, "redis://10.0.0.1:6379/2");
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = config_from(&[
            ("REDIS_POOL_SIZE", "lots"),
            ("CACHE_BATCH_SIZE", "0"),
            ("CACHE_SWEEP_INTERVAL_SECONDS", "-5"),
        ]);

        assert_eq!(config.remote.pool_size, 50);
        assert_eq!(config.embedded.batch_size, 100_000);
        assert_eq!(config.sweep_interval_seconds, 86_400);
    }

    #[test]
    fn test_embedded_settings() {
        let config = config_from(&[
            ("CACHE", "badger"),
            ("CACHE_DIR", "/var/lib/app/cache"),
            ("CACHE_BATCH_SIZE", "500"),
            ("CACHE_SWEEP_INTERVAL_SECONDS", "60"),
        ]);

        assert_eq!(config.backend, CacheBackend::Embedded);
        assert_eq!(config.embedded.directory, PathBuf::from("/var/lib/app/cache"));
        assert_eq!(config.embedded.batch_size, 500);
        assert_eq!(config.sweep_interval_seconds, 60);
    }
}
