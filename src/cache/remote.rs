//! Remote Cache Module
//!
//! Maps the [`Cache`] contract onto a [`RemoteStore`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::cache::{chain_callbacks, Cache, EvictionCallback};
use crate::error::{CacheError, Result};
use crate::remote::RemoteStore;

/// Acknowledgement the store returns for a successful write.
const SET_ACK: &str = "OK";

// == Remote Cache ==
/// Cache backed by a remote key-value store.
///
/// Eviction hooks fire for removals made through this adapter. Expiry
/// performed by the server itself is not observable here.
pub struct RemoteCache<S> {
    store: S,
    on_evicted: RwLock<Option<EvictionCallback>>,
}

impl<S: RemoteStore> RemoteCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            on_evicted: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn evicted(&self, key: &str, value: &Bytes) {
        let callback = self.on_evicted.read().clone();
        if let Some(callback) = callback {
            callback(key, value);
        }
    }
}

#[async_trait]
impl<S: RemoteStore> Cache for RemoteCache<S> {
    async fn get(&self, key: &str) -> Result<Bytes> {
        self.store
            .get(key)
            .await?
            .ok_or_else(|| CacheError::KeyNotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let ack = self.store.set(key, value, ttl).await?;
        if ack != SET_ACK {
            return Err(CacheError::CacheWriteFailed(format!("{key}: store replied {ack}")));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // Without a hook a plain DEL is enough; with one, the removed value
        // has to be read back for it.
        if self.on_evicted.read().is_none() {
            self.store.delete(key).await?;
            return Ok(());
        }
        if let Some(value) = self.store.get_del(key).await? {
            self.evicted(key, &value);
        }
        Ok(())
    }

    async fn load_and_delete(&self, key: &str) -> Result<Bytes> {
        let value = self
            .store
            .get_del(key)
            .await?
            .ok_or_else(|| CacheError::KeyNotFound(key.to_string()))?;
        self.evicted(key, &value);
        Ok(value)
    }

    fn on_evicted(&self, callback: EvictionCallback) {
        let mut slot = self.on_evicted.write();
        *slot = Some(match slot.take() {
            Some(existing) => chain_callbacks(existing, callback),
            None => callback,
        });
    }
}

impl<S: RemoteStore> From<S> for RemoteCache<S> {
    fn from(store: S) -> Self {
        Self::new(store)
    }
}
