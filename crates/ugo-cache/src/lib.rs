//! # Ugo Cache
//!
//! One caching contract over two backends.
//!
//! This crate provides:
//! - An embedded, durable on-disk cache backed by redb
//! - A Redis cache reached through a deadpool connection pool
//! - A [`Cache`] facade dispatching get, set, has, forget, empty and
//!   prefix eviction to whichever backend was configured
//! - The record codec shared by both backends
//! - Cache configuration from environment variables
//!
//! # Example
//!
//! ```ignore
//! use ugo_cache::{Cache, EmbeddedCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ugo_cache::CacheError> {
//!     let cache = Cache::from(EmbeddedCache::open("./tmp/badger")?);
//!
//!     // Set a value that expires after five minutes
//!     cache.set("greeting", "hello", Some(300)).await?;
//!
//!     // Get a value
//!     let greeting: String = cache.get("greeting").await?;
//!
//!     // Drop everything under a prefix
//!     cache.empty_by_match("user:").await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod embedded;
pub mod error;
pub mod remote;

pub use cache::Cache;
pub use codec::{CacheEntry, decode, encode};
pub use config::{CacheBackend, CacheConfig, EmbeddedCacheConfig, RemoteCacheConfig};
pub use embedded::EmbeddedCache;
pub use error::{BackendError, CacheError};
pub use remote::RemoteCache;
