//! Local Cache Module
//!
//! In-process map store with lazy expiry on read and a background TTL sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::stats::StatsRecorder;
use crate::cache::{
    chain_callbacks, Cache, CacheEntry, CacheStats, CheckedSet, EvictionCallback,
    DEFAULT_SWEEP_BATCH,
};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_sweep_task;

// == Local Cache Config ==
/// Background sweep settings for [`LocalCache`].
#[derive(Debug, Clone)]
pub struct LocalCacheConfig {
    /// Interval between sweep ticks
    pub sweep_interval: Duration,
    /// Maximum entries inspected per tick
    pub sweep_batch: usize,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            sweep_batch: DEFAULT_SWEEP_BATCH,
        }
    }
}

impl From<&Config> for LocalCacheConfig {
    fn from(config: &Config) -> Self {
        Self {
            sweep_interval: config.sweep_interval(),
            sweep_batch: config.sweep_batch,
        }
    }
}

// == Store State ==
/// State shared between the cache handle and its sweep task.
pub(crate) struct StoreState {
    entries: RwLock<HashMap<String, CacheEntry>>,
    on_evicted: RwLock<Option<EvictionCallback>>,
    stats: StatsRecorder,
    /// Iteration offset where the next sweep tick resumes
    sweep_cursor: AtomicUsize,
}

impl StoreState {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            on_evicted: RwLock::new(None),
            stats: StatsRecorder::default(),
            sweep_cursor: AtomicUsize::new(0),
        }
    }

    /// Removes `key` while the write lock is held and fires the eviction hook.
    fn remove_locked(&self, entries: &mut HashMap<String, CacheEntry>, key: &str) -> Option<CacheEntry> {
        let entry = entries.remove(key)?;
        self.stats.record_eviction();
        let callback = self.on_evicted.read().clone();
        if let Some(callback) = callback {
            callback(key, &entry.value);
        }
        Some(entry)
    }

    /// Deletes expired entries among at most `batch` inspected ones.
    ///
    /// Each call resumes where the previous one stopped and wraps around, so
    /// successive ticks cover the whole map. One tick is still not
    /// guaranteed to clear every expired entry under high key cardinality;
    /// expiry on read applies to whatever is left.
    pub(crate) fn sweep_expired(&self, batch: usize) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let len = entries.len();
        if len == 0 || batch == 0 {
            return 0;
        }

        let start = self.sweep_cursor.load(Ordering::Relaxed) % len;
        let inspect = batch.min(len);
        let next = (start + inspect) % len;
        // Each removal before `next` in iteration order shifts it down by one.
        let mut removed_before_next = 0;
        let expired: Vec<String> = entries
            .iter()
            .enumerate()
            .skip(start)
            .chain(entries.iter().enumerate())
            .take(inspect)
            .filter(|(_, (_, entry))| entry.is_expired_at(now))
            .map(|(ordinal, (key, _))| {
                if ordinal < next {
                    removed_before_next += 1;
                }
                key.clone()
            })
            .collect();
        self.sweep_cursor
            .store(next - removed_before_next, Ordering::Relaxed);

        for key in &expired {
            self.remove_locked(&mut entries, key);
        }
        expired.len()
    }
}

// == Local Cache ==
/// Bounded-lock in-process cache.
///
/// A single read/write lock guards the map. Eviction hooks run while that
/// lock is held, so they must not call back into the same cache.
pub struct LocalCache {
    state: Arc<StoreState>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl LocalCache {
    // == Constructor ==
    /// Creates a cache and starts its sweep task. Requires a tokio runtime.
    pub fn new(config: LocalCacheConfig) -> Self {
        let state = Arc::new(StoreState::new());
        let shutdown = CancellationToken::new();
        spawn_sweep_task(
            state.clone(),
            config.sweep_interval,
            config.sweep_batch,
            shutdown.clone(),
        );

        Self {
            state,
            shutdown,
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(LocalCacheConfig::from(config))
    }

    // == Close ==
    /// Stops the background sweep.
    ///
    /// Returns `AlreadyClosed` on any call after the first.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(CacheError::AlreadyClosed);
        }
        self.shutdown.cancel();
        info!("Local cache closed");
        Ok(())
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.state.stats.snapshot(self.len())
    }

    /// Entries physically present, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.state.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> Arc<StoreState> {
        self.state.clone()
    }

    /// Runs one sweep pass immediately.
    pub fn sweep(&self, batch: usize) -> usize {
        self.state.sweep_expired(batch)
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new(LocalCacheConfig::default())
    }
}

impl Drop for LocalCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Cache for LocalCache {
    async fn get(&self, key: &str) -> Result<Bytes> {
        let now = Instant::now();
        {
            let entries = self.state.entries.read();
            match entries.get(key) {
                None => {
                    self.state.stats.record_miss();
                    return Err(CacheError::KeyNotFound(key.to_string()));
                }
                Some(entry) if !entry.is_expired_at(now) => {
                    self.state.stats.record_hit();
                    return Ok(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // Re-check under the write lock: a concurrent set or delete may have
        // replaced the entry between the two locks.
        let mut entries = self.state.entries.write();
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                self.state.stats.record_hit();
                return Ok(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.state.remove_locked(&mut entries, key);
            debug!(key, "Removed expired entry on read");
        }
        self.state.stats.record_miss();
        Err(CacheError::KeyNotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.state.entries.write();
        entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.state.entries.write();
        self.state.remove_locked(&mut entries, key);
        Ok(())
    }

    async fn load_and_delete(&self, key: &str) -> Result<Bytes> {
        let mut entries = self.state.entries.write();
        match self.state.remove_locked(&mut entries, key) {
            Some(entry) if !entry.is_expired() => Ok(entry.value),
            _ => Err(CacheError::KeyNotFound(key.to_string())),
        }
    }

    fn on_evicted(&self, callback: EvictionCallback) {
        let mut slot = self.state.on_evicted.write();
        *slot = Some(match slot.take() {
            Some(existing) => chain_callbacks(existing, callback),
            None => callback,
        });
    }
}

impl CheckedSet for LocalCache {
    fn set_checked(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
        admit: &mut (dyn FnMut(bool) -> Result<()> + Send),
    ) -> Result<()> {
        let mut entries = self.state.entries.write();
        admit(entries.contains_key(key))?;
        entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }
}
