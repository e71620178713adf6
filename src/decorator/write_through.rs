//! Write-through decorator: writes go to the cache and to a [`Persister`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::cache::{Cache, EvictionCallback};
use crate::decorator::{BackgroundFailure, Persister};
use crate::error::Result;

/// How much of a write the caller waits for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Wait for the cache write, then the persist
    #[default]
    Sync,
    /// Wait for the cache write; persist in the background
    SemiAsync,
    /// Return at once; persist, then write the cache, in the background
    Async,
}

// == Write Through ==
/// Applies every `set` to `inner` and to `persister`.
pub struct WriteThrough<C, P> {
    inner: Arc<C>,
    persister: Arc<P>,
    mode: WriteMode,
    on_failure: BackgroundFailure,
}

impl<C, P> WriteThrough<C, P>
where
    C: Cache + 'static,
    P: Persister + 'static,
{
    pub fn new(inner: C, persister: P) -> Self {
        Self {
            inner: Arc::new(inner),
            persister: Arc::new(persister),
            mode: WriteMode::default(),
            on_failure: BackgroundFailure::default(),
        }
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_background_failure(mut self, on_failure: BackgroundFailure) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn spawn_persist(&self, key: &str, value: Bytes, ttl: Option<Duration>) {
        let persister = Arc::clone(&self.persister);
        let key = key.to_string();
        let on_failure = self.on_failure;
        tokio::spawn(async move {
            if let Err(err) = persister.persist(&key, value, ttl).await {
                on_failure.report("write-through persist", &key, &err);
            }
        });
    }

    fn spawn_persist_then_cache(&self, key: &str, value: Bytes, ttl: Option<Duration>) {
        let inner = Arc::clone(&self.inner);
        let persister = Arc::clone(&self.persister);
        let key = key.to_string();
        let on_failure = self.on_failure;
        tokio::spawn(async move {
            // An unpersisted value is never cached.
            if let Err(err) = persister.persist(&key, value.clone(), ttl).await {
                on_failure.report("write-through persist", &key, &err);
                return;
            }
            if let Err(err) = inner.set(&key, value, ttl).await {
                on_failure.report("write-through cache write", &key, &err);
            }
        });
    }
}

#[async_trait]
impl<C, P> Cache for WriteThrough<C, P>
where
    C: Cache + 'static,
    P: Persister + 'static,
{
    async fn get(&self, key: &str) -> Result<Bytes> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        match self.mode {
            WriteMode::Sync => {
                self.inner.set(key, value.clone(), ttl).await?;
                self.persister.persist(key, value, ttl).await
            }
            WriteMode::SemiAsync => {
                let cached = self.inner.set(key, value.clone(), ttl).await;
                self.spawn_persist(key, value, ttl);
                cached
            }
            WriteMode::Async => {
                self.spawn_persist_then_cache(key, value, ttl);
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn load_and_delete(&self, key: &str) -> Result<Bytes> {
        self.inner.load_and_delete(key).await
    }

    fn on_evicted(&self, callback: EvictionCallback) {
        self.inner.on_evicted(callback)
    }
}
