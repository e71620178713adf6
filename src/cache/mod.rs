//! Cache Module
//!
//! Defines the [`Cache`] contract shared by every backing store and decorator,
//! plus the in-process and remote implementations.

mod entry;
pub(crate) mod local;
mod lru;
mod remote;
mod stats;


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

// Re-export public types
pub use entry::CacheEntry;
pub use local::{LocalCache, LocalCacheConfig};
pub use lru::LruTracker;
pub use remote::RemoteCache;
pub use stats::CacheStats;

// == Public Constants ==
/// Default number of entries inspected per background sweep tick
pub const DEFAULT_SWEEP_BATCH: usize = 1000;

// == Eviction Callback ==
/// Hook invoked whenever an entry leaves a store.
pub type EvictionCallback = Arc<dyn Fn(&str, &Bytes) + Send + Sync>;

/// Runs `second` after `first`.
pub(crate) fn chain_callbacks(first: EvictionCallback, second: EvictionCallback) -> EvictionCallback {
    Arc::new(move |key, value| {
        first(key, value);
        second(key, value);
    })
}

// == Cache Trait ==
/// Capability set shared by backing stores and decorators.
///
/// A `ttl` of `None` or zero means the entry never expires.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the value, or `KeyNotFound` if absent or expired.
    async fn get(&self, key: &str) -> Result<Bytes>;

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()>;

    /// Removes the key. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically removes and returns the value.
    async fn load_and_delete(&self, key: &str) -> Result<Bytes>;

    /// Registers a hook fired whenever an entry leaves the store by any path.
    /// Registering twice chains both hooks.
    fn on_evicted(&self, callback: EvictionCallback);
}

#[async_trait]
impl<C: Cache + ?Sized> Cache for Arc<C> {
    async fn get(&self, key: &str) -> Result<Bytes> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn load_and_delete(&self, key: &str) -> Result<Bytes> {
        (**self).load_and_delete(key).await
    }

    fn on_evicted(&self, callback: EvictionCallback) {
        (**self).on_evicted(callback)
    }
}

// == Checked Set ==
/// Stores that can gate a write on the key's presence under their own lock.
pub trait CheckedSet: Cache {
    /// Calls `admit` with whether `key` is currently present and writes the
    /// value only if it returns `Ok`. The check, whatever `admit` mutates and
    /// the write happen under one lock, atomically with respect to evictions.
    fn set_checked(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
        admit: &mut (dyn FnMut(bool) -> Result<()> + Send),
    ) -> Result<()>;
}

impl<C: CheckedSet + ?Sized> CheckedSet for Arc<C> {
    fn set_checked(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
        admit: &mut (dyn FnMut(bool) -> Result<()> + Send),
    ) -> Result<()> {
        (**self).set_checked(key, value, ttl, admit)
    }
}
