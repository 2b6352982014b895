//! Embedded on-disk cache backed by redb.
//!
//! Records live in the `cache_entries` table under their unprefixed key.
//! Entries written with a TTL also get a row in `cache_expirations` holding
//! the absolute deadline in UNIX milliseconds; reads treat an entry whose
//! deadline has passed as absent. Expired rows are physically removed by
//! [`EmbeddedCache::purge_expired`], which the host schedules.
//!
//! redb is synchronous, so every operation runs on the blocking pool.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::codec::{decode_value, encode_value};
use crate::error::CacheError;

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("cache_entries");
const EXPIRATIONS: TableDefinition<&str, u64> = TableDefinition::new("cache_expirations");

/// File created inside the cache directory.
pub const DATABASE_FILE: &str = "cache.redb";

/// Number of keys deleted per write transaction by bulk eviction.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Cache stored in a local redb database.
#[derive(Clone)]
pub struct EmbeddedCache {
    db: Arc<Database>,
    batch_size: usize,
}

impl fmt::Debug for EmbeddedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedCache")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl EmbeddedCache {
    /// Opens (or creates) the cache database inside `directory`.
    ///
    /// The directory is created if it does not exist. Its contents are
    /// managed entirely by redb.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Backend` if the directory cannot be created or
    /// the database cannot be opened.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self, CacheError> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory)?;

        let db = Database::create(directory.join(DATABASE_FILE)).map_err(redb::Error::from)?;
        create_tables(&db)?;

        debug!(cache.dir = %directory.display(), "Embedded cache opened");

        Ok(Self {
            db: Arc::new(db),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Sets how many keys bulk eviction deletes per write transaction.
    ///
    /// A size of zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Gets a cached value by key.
    ///
    /// # Errors
    ///
    /// `CacheError::NotFound` if the key is absent or expired,
    /// `CacheError::Decode` if the record cannot be read as `T`.
    #[instrument(skip(self), fields(cache.backend = "embedded", cache.operation = "GET"))]
    pub async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: DeserializeOwned,
    {
        let db = Arc::clone(&self.db);
        let storage_key = key.to_owned();

        let raw = tokio::task::spawn_blocking(move || read_live(&db, &storage_key)).await??;

        match raw {
            Some(bytes) => {
                debug!(cache.key = %key, "Cache hit");
                decode_value(key, &bytes)
            }
            None => {
                debug!(cache.key = %key, "Cache miss");
                Err(CacheError::NotFound(key.to_owned()))
            }
        }
    }

    /// Stores `value` under `key`, replacing any previous record.
    ///
    /// A `ttl_seconds` greater than zero makes the entry unreadable after
    /// that many seconds; `None` or zero stores it without expiry and drops
    /// any deadline left by an earlier write.
    #[instrument(skip(self, value), fields(cache.backend = "embedded", cache.operation = "SET"))]
    pub async fn set<T>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
    ) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let bytes = encode_value(key, value)?;
        let deadline = ttl_seconds
            .filter(|ttl| *ttl > 0)
            .map(|ttl| now_millis().saturating_add(ttl.saturating_mul(1_000)));

        let db = Arc::clone(&self.db);
        let storage_key = key.to_owned();

        tokio::task::spawn_blocking(move || write_entry(&db, &storage_key, &bytes, deadline))
            .await??;

        debug!(cache.key = %key, cache.ttl_secs = ?ttl_seconds, "Cache set");

        Ok(())
    }

    /// Deletes `key`. Deleting an absent key succeeds.
    #[instrument(skip(self), fields(cache.backend = "embedded", cache.operation = "DEL"))]
    pub async fn forget(&self, key: &str) -> Result<(), CacheError> {
        let db = Arc::clone(&self.db);
        let keys = vec![key.to_owned()];

        tokio::task::spawn_blocking(move || delete_keys(&db, &keys)).await??;

        debug!(cache.key = %key, "Cache invalidated");

        Ok(())
    }

    /// Deletes every key in the store.
    pub async fn empty(&self) -> Result<(), CacheError> {
        self.empty_by_match("").await
    }

    /// Deletes every key starting with `pattern`.
    ///
    /// Keys are read from a single snapshot and deleted in write
    /// transactions of at most [`batch_size`](Self::batch_size) keys each, so
    /// the whole operation is not atomic:
    ///
    /// - a `set` racing with this call on a key that was already captured in
    ///   a pending batch may survive or be deleted;
    /// - if a batch fails, the error is returned and batches flushed before
    ///   it stay deleted.
    #[instrument(skip(self), fields(cache.backend = "embedded", cache.operation = "DEL_PREFIX"))]
    pub async fn empty_by_match(&self, pattern: &str) -> Result<(), CacheError> {
        let db = Arc::clone(&self.db);
        let prefix = pattern.to_owned();
        let batch_size = self.batch_size;

        let deleted =
            tokio::task::spawn_blocking(move || delete_prefix(&db, &prefix, batch_size)).await??;

        debug!(cache.pattern = %pattern, cache.deleted = %deleted, "Pattern invalidation complete");

        Ok(())
    }

    /// Removes every entry whose TTL has elapsed and returns how many were
    /// removed.
    ///
    /// Never called by the cache operations themselves; the host runs it
    /// periodically.
    #[instrument(skip(self), fields(cache.backend = "embedded", cache.operation = "PURGE_EXPIRED"))]
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let db = Arc::clone(&self.db);
        let batch_size = self.batch_size;
        let now = now_millis();

        let purged =
            tokio::task::spawn_blocking(move || delete_expired(&db, now, batch_size)).await??;

        debug!(cache.purged = %purged, "Expired entries purged");

        Ok(purged)
    }

    /// Writes raw record bytes, bypassing the codec.
    #[cfg(test)]
    pub(crate) fn put_raw(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        write_entry(&self.db, key, bytes, None)?;
        Ok(())
    }
}

fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

fn create_tables(db: &Database) -> Result<(), redb::Error> {
    let txn = db.begin_write()?;
    {
        txn.open_table(ENTRIES)?;
        txn.open_table(EXPIRATIONS)?;
    }
    txn.commit()?;
    Ok(())
}

fn read_live(db: &Database, key: &str) -> Result<Option<Vec<u8>>, redb::Error> {
    let txn = db.begin_read()?;

    let expirations = txn.open_table(EXPIRATIONS)?;
    if let Some(deadline) = expirations.get(key)? {
        if deadline.value() <= now_millis() {
            return Ok(None);
        }
    }

    let entries = txn.open_table(ENTRIES)?;
    let raw = entries.get(key)?.map(|guard| guard.value().to_vec());
    Ok(raw)
}

fn write_entry(
    db: &Database,
    key: &str,
    bytes: &[u8],
    deadline: Option<u64>,
) -> Result<(), redb::Error> {
    let txn = db.begin_write()?;
    {
        let mut entries = txn.open_table(ENTRIES)?;
        entries.insert(key, bytes)?;

        let mut expirations = txn.open_table(EXPIRATIONS)?;
        match deadline {
            Some(deadline) => {
                expirations.insert(key, deadline)?;
            }
            None => {
                expirations.remove(key)?;
            }
        }
    }
    txn.commit()?;
    Ok(())
}

fn delete_keys(db: &Database, keys: &[String]) -> Result<(), redb::Error> {
    let txn = db.begin_write()?;
    {
        let mut entries = txn.open_table(ENTRIES)?;
        let mut expirations = txn.open_table(EXPIRATIONS)?;
        for key in keys {
            entries.remove(key.as_str())?;
            expirations.remove(key.as_str())?;
        }
    }
    txn.commit()?;
    Ok(())
}

/// Scans `prefix` from one read snapshot and deletes matches in batches.
fn delete_prefix(db: &Database, prefix: &str, batch_size: usize) -> Result<u64, redb::Error> {
    let txn = db.begin_read()?;
    let entries = txn.open_table(ENTRIES)?;

    let mut batch: Vec<String> = Vec::with_capacity(batch_size);
    let mut deleted = 0u64;

    for item in entries.range::<&str>(prefix..)? {
        let (key, _) = item?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }

        batch.push(key.to_owned());
        if batch.len() == batch_size {
            delete_keys(db, &batch)?;
            deleted += batch.len() as u64;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        delete_keys(db, &batch)?;
        deleted += batch.len() as u64;
    }

    Ok(deleted)
}

fn delete_expired(db: &Database, now: u64, batch_size: usize) -> Result<u64, redb::Error> {
    let txn = db.begin_read()?;
    let expirations = txn.open_table(EXPIRATIONS)?;

    let mut batch: Vec<String> = Vec::with_capacity(batch_size.min(1_024));
    let mut purged = 0u64;

    for item in expirations.iter()? {
        let (key, deadline) = item?;
        if deadline.value() > now {
            continue;
        }

        batch.push(key.value().to_owned());
        if batch.len() == batch_size {
            purged += delete_still_expired(db, &batch, now)?;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        purged += delete_still_expired(db, &batch, now)?;
    }

    Ok(purged)
}

/// Deletes the keys whose deadline is still in the past inside the write
/// transaction; keys rewritten since the scan are left alone.
fn delete_still_expired(db: &Database, keys: &[String], now: u64) -> Result<u64, redb::Error> {
    let txn = db.begin_write()?;
    let mut purged = 0u64;
    {
        let mut entries = txn.open_table(ENTRIES)?;
        let mut expirations = txn.open_table(EXPIRATIONS)?;
        for key in keys {
            let expired = match expirations.get(key.as_str())? {
                Some(deadline) => deadline.value() <= now,
                None => false,
            };
            if expired {
                expirations.remove(key.as_str())?;
                entries.remove(key.as_str())?;
                purged += 1;
            }
        }
    }
    txn.commit()?;
    Ok(purged)
}
