//! Remote Store Module
//!
//! The key-value contract consumed by [`RemoteCache`](crate::cache::RemoteCache)
//! and the lock client, with a Redis-backed and an in-process implementation.

mod memory;
mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

// == Script ==
/// A server-side script executed as one atomic unit.
///
/// `name` identifies the script to stores that do not run Lua.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Script {
    name: &'static str,
    source: &'static str,
}

impl Script {
    pub const fn new(name: &'static str, source: &'static str) -> Self {
        Self { name, source }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn source(&self) -> &'static str {
        self.source
    }
}

// == Remote Store Trait ==
/// Primitives a remote key-value store must provide.
///
/// Timeouts must surface as `CacheError::Timeout` so callers can tell them
/// apart from other failures.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Writes the value and returns the store's acknowledgement.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<String>;

    /// Returns the number of keys removed.
    async fn delete(&self, key: &str) -> Result<u64>;

    /// Removes and returns the value, `None` when absent.
    async fn get_del(&self, key: &str) -> Result<Option<Bytes>>;

    /// Executes `script` atomically against the store.
    async fn eval(&self, script: &Script, keys: &[&str], args: &[String]) -> Result<i64>;
}

#[async_trait]
impl<S: RemoteStore + ?Sized> RemoteStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<String> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        (**self).delete(key).await
    }

    async fn get_del(&self, key: &str) -> Result<Option<Bytes>> {
        (**self).get_del(key).await
    }

    async fn eval(&self, script: &Script, keys: &[&str], args: &[String]) -> Result<i64> {
        (**self).eval(script, keys, args).await
    }
}
