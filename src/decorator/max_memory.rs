//! Byte-budget LRU limiter.
//!
//! Keeps the total size of stored values within a byte budget by evicting
//! least recently used keys before each write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{Cache, EvictionCallback, LruTracker};
use crate::error::{CacheError, Result};

#[derive(Default)]
struct Usage {
    used: u64,
    sizes: HashMap<String, u64>,
    order: LruTracker,
}

impl Usage {
    fn record(&mut self, key: &str, size: u64) {
        self.forget(key);
        self.used += size;
        self.sizes.insert(key.to_string(), size);
        self.order.touch(key);
    }

    fn forget(&mut self, key: &str) {
        if let Some(size) = self.sizes.remove(key) {
            self.used -= size;
        }
        self.order.remove(key);
    }
}

// == Max Memory Limiter ==
/// Bounds the summed length of stored values to `max_bytes`.
///
/// Accounting is driven by the inner store's eviction hook, so removals by
/// any path (delete, sweep, eviction here) release their bytes.
///
/// Writes and removals are serialized by an async gate that stays held
/// across the inner store calls. Over a [`RemoteCache`](crate::cache::RemoteCache)
/// that means one network round trip at a time per limiter; byte accounting
/// never observes a half-applied write in exchange.
pub struct MaxMemoryLimiter<C> {
    inner: C,
    max_bytes: u64,
    usage: Arc<Mutex<Usage>>,
    /// Serializes writers and removals through this limiter.
    gate: tokio::sync::Mutex<()>,
}

impl<C: Cache> MaxMemoryLimiter<C> {
    pub fn new(inner: C, max_bytes: u64) -> Self {
        let usage = Arc::new(Mutex::new(Usage::default()));
        let tracked = Arc::clone(&usage);
        inner.on_evicted(Arc::new(move |key: &str, _: &Bytes| {
            tracked.lock().forget(key);
        }));

        Self {
            inner,
            max_bytes,
            usage,
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Bytes currently accounted to stored values.
    pub fn used_bytes(&self) -> u64 {
        self.usage.lock().used
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Tracked keys, least recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.usage.lock().order.keys().map(str::to_owned).collect()
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn evict_until_fits(&self, size: u64) -> Result<()> {
        loop {
            let oldest = {
                let usage = self.usage.lock();
                if usage.used + size <= self.max_bytes {
                    return Ok(());
                }
                usage.order.oldest().map(str::to_owned)
            };
            let Some(oldest) = oldest else {
                return Err(CacheError::OverCapacity(format!(
                    "{size} bytes exceed budget of {}",
                    self.max_bytes
                )));
            };

            self.inner.delete(&oldest).await?;
            // The store may have dropped the key without telling us.
            self.usage.lock().forget(&oldest);
            debug!(key = %oldest, "Evicted least recently used entry");
        }
    }
}

#[async_trait]
impl<C: Cache> Cache for MaxMemoryLimiter<C> {
    async fn get(&self, key: &str) -> Result<Bytes> {
        let value = self.inner.get(key).await?;
        let mut usage = self.usage.lock();
        if usage.sizes.contains_key(key) {
            usage.order.touch(key);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let size = value.len() as u64;
        if size > self.max_bytes {
            return Err(CacheError::OverCapacity(format!(
                "{key}: {size} bytes exceed budget of {}",
                self.max_bytes
            )));
        }

        let _gate = self.gate.lock().await;

        // Drop the previous value first so it is not counted twice.
        match self.inner.load_and_delete(key).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        self.usage.lock().forget(key);

        self.evict_until_fits(size).await?;

        self.usage.lock().record(key, size);
        if let Err(err) = self.inner.set(key, value, ttl).await {
            self.usage.lock().forget(key);
            return Err(err);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _gate = self.gate.lock().await;
        self.inner.delete(key).await?;
        self.usage.lock().forget(key);
        Ok(())
    }

    async fn load_and_delete(&self, key: &str) -> Result<Bytes> {
        let _gate = self.gate.lock().await;
        let value = self.inner.load_and_delete(key).await?;
        self.usage.lock().forget(key);
        Ok(value)
    }

    fn on_evicted(&self, callback: EvictionCallback) {
        self.inner.on_evicted(callback)
    }
}
