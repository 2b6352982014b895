use tempfile::TempDir;
use ugo::ugo_cache::{Cache, EmbeddedCache, RemoteCache, RemoteCacheConfig};
use uuid::Uuid;

/// Opens a fresh embedded cache in a temporary directory.
///
/// Keep the returned `TempDir` alive for as long as the cache is used.
#[allow(dead_code)]
pub fn embedded_cache() -> (TempDir, Cache) {
    let dir = TempDir::new().unwrap();
    let cache = EmbeddedCache::open(dir.path().join("badger")).unwrap();
    (dir, Cache::from(cache))
}

/// Same as [`embedded_cache`] with a small delete batch.
#[allow(dead_code)]
pub fn embedded_cache_with_batch(batch_size: usize) -> (TempDir, Cache) {
    let dir = TempDir::new().unwrap();
    let cache = EmbeddedCache::open(dir.path().join("badger"))
        .unwrap()
        .with_batch_size(batch_size);
    (dir, Cache::from(cache))
}

/// Builds a Redis-backed cache with a prefix no other test uses.
#[allow(dead_code)]
pub fn remote_cache() -> Cache {
    let config = RemoteCacheConfig {
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
        key_prefix: generate_unique_prefix(),
        pool_size: 8,
    };
    Cache::from(RemoteCache::new(&config).unwrap())
}

pub fn generate_unique_prefix() -> String {
    format!("test-ug-{}", Uuid::new_v4())
}
