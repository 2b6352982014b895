//! Cache ownership for a host process.
//!
//! [`CacheHost`] turns a [`CacheConfig`] into a live [`Cache`], runs the
//! periodic expired-entry sweep for the embedded store, and releases
//! everything on shutdown.

use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use ugo_cache::{Cache, CacheBackend, CacheConfig, EmbeddedCache, RemoteCache};
use ugo_observability::init_basic_console_logging;

/// Owns the configured cache and its maintenance task.
#[derive(Debug)]
pub struct CacheHost {
    cache: Option<Cache>,
    sweeper: Option<JoinHandle<()>>,
}

impl CacheHost {
    /// Loads `.env`, installs console logging, reads
    /// [`CacheConfig::from_env`] and starts the host.
    ///
    /// Logging goes through [`init_basic_console_logging`], which leaves an
    /// already installed global subscriber in place. Processes that call
    /// [`CacheHost::start`] directly set up their own subscriber.
    pub async fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        init_basic_console_logging();
        Self::start(&CacheConfig::from_env()).await
    }

    /// Builds the cache selected by `config`.
    ///
    /// The embedded store gets a background sweep every
    /// `sweep_interval_seconds`. A Redis server that cannot be reached yet
    /// is logged but does not fail startup; the pool reconnects on demand.
    ///
    /// # Errors
    ///
    /// Fails if the embedded store cannot be opened or the Redis pool
    /// cannot be created from the configured URL.
    pub async fn start(config: &CacheConfig) -> anyhow::Result<Self> {
        match config.backend {
            CacheBackend::Disabled => {
                info!("Cache disabled");
                Ok(Self {
                    cache: None,
                    sweeper: None,
                })
            }
            CacheBackend::Embedded => {
                let cache = EmbeddedCache::open(&config.embedded.directory)
                    .with_context(|| {
                        format!(
                            "failed to open embedded cache at {}",
                            config.embedded.directory.display()
                        )
                    })?
                    .with_batch_size(config.embedded.batch_size);

                let sweeper = Self::spawn_sweeper(
                    cache.clone(),
                    Duration::from_secs(config.sweep_interval_seconds),
                );

                info!(cache.dir = %config.embedded.directory.display(), "Embedded cache ready");

                Ok(Self {
                    cache: Some(Cache::Embedded(cache)),
                    sweeper: Some(sweeper),
                })
            }
            CacheBackend::Remote => {
                let cache = RemoteCache::new(&config.remote)
                    .context("failed to create Redis connection pool")?;

                match cache.ping().await {
                    Ok(()) => info!(cache.prefix = %cache.prefix(), "Redis cache ready"),
                    Err(e) => warn!(error = %e, "Redis not reachable at startup"),
                }

                Ok(Self {
                    cache: Some(Cache::Remote(cache)),
                    sweeper: None,
                })
            }
        }
    }

    /// The configured cache, if any.
    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    /// Runs [`EmbeddedCache::purge_expired`] every `period`, starting one
    /// period from now. Failures are logged and the next run proceeds.
    pub fn spawn_sweeper(cache: EmbeddedCache, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match cache.purge_expired().await {
                    Ok(purged) => debug!(cache.purged = %purged, "Cache sweep complete"),
                    Err(e) => error!(error = %e, "Cache sweep failed"),
                }
            }
        })
    }

    /// Stops the sweep and closes the Redis pool.
    ///
    /// The embedded store is closed once the last clone of the cache is
    /// dropped.
    pub async fn shutdown(mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
            let _ = sweeper.await;
        }

        if let Some(Cache::Remote(cache)) = self.cache.take() {
            cache.close();
        }

        info!("Cache shut down");
    }
}

impl Drop for CacheHost {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}
