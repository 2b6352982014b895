//! # Ugo
//!
//! Host-side wiring for the ugo cache.
//!
//! The host process builds exactly one cache from configuration, owns it,
//! and hands clones of it to whatever needs caching. Nothing is stored in
//! globals.
//!
//! [`CacheHost::from_env`] also installs console logging from
//! `ugo_observability`; `LOG_LEVEL` sets the level.
//!
//! ## Environment Variables
//!
//! ```bash
//! CACHE=redis                 # or badger / embedded; unset disables caching
//! REDIS_HOST=127.0.0.1:6379
//! REDIS_PASSWORD=
//! REDIS_PREFIX=myapp
//! CACHE_DIR=./tmp/badger
//! CACHE_SWEEP_INTERVAL_SECONDS=86400
//! LOG_LEVEL=info
//! ```
//!
//! ## Modules
//!
//! - [`host`]: building, maintaining and shutting down the configured cache

pub mod host;

pub use host::CacheHost;

// Re-export workspace crates for convenience
pub use ugo_cache;
pub use ugo_observability;
