//! Read-through decorator: a miss is filled from a [`Loader`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::cache::{Cache, EvictionCallback};
use crate::decorator::{BackgroundFailure, Loader};
use crate::error::{CacheError, Result};

/// How much of the miss path the caller waits for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadMode {
    /// Wait for the load and the write-back
    #[default]
    Sync,
    /// Wait for the load; write back in the background
    SemiAsync,
    /// Return the miss at once; load and write back in the background
    Async,
}

// == Read Through ==
/// Fills misses of `inner` from `loader`, caching loaded values for
/// `expiration`.
///
/// In `Sync` mode a failed write-back is returned as `RefreshCacheFailed`,
/// which still carries the loaded value. Load failures are returned as they
/// are.
pub struct ReadThrough<C, L> {
    inner: Arc<C>,
    loader: Arc<L>,
    expiration: Option<Duration>,
    mode: ReadMode,
    on_failure: BackgroundFailure,
}

impl<C, L> ReadThrough<C, L>
where
    C: Cache + 'static,
    L: Loader + 'static,
{
    pub fn new(inner: C, loader: L, expiration: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(inner),
            loader: Arc::new(loader),
            expiration,
            mode: ReadMode::default(),
            on_failure: BackgroundFailure::default(),
        }
    }

    pub fn with_mode(mut self, mode: ReadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Policy for failures of detached write-backs.
    pub fn with_background_failure(mut self, on_failure: BackgroundFailure) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    async fn load_sync(&self, key: &str) -> Result<Bytes> {
        let value = self.loader.load(key).await?;
        if let Err(err) = self.inner.set(key, value.clone(), self.expiration).await {
            return Err(CacheError::RefreshCacheFailed {
                key: key.to_string(),
                value,
                reason: err.to_string(),
            });
        }
        Ok(value)
    }

    async fn load_semi_async(&self, key: &str) -> Result<Bytes> {
        let value = self.loader.load(key).await?;
        spawn_write_back(
            Arc::clone(&self.inner),
            key.to_string(),
            value.clone(),
            self.expiration,
            self.on_failure,
        );
        Ok(value)
    }

    fn load_async(&self, key: &str) {
        let inner = Arc::clone(&self.inner);
        let loader = Arc::clone(&self.loader);
        let key = key.to_string();
        let expiration = self.expiration;
        let on_failure = self.on_failure;

        tokio::spawn(async move {
            let value = match loader.load(&key).await {
                Ok(value) => value,
                Err(err) => {
                    warn!(key = %key, error = %err, "Background load failed");
                    return;
                }
            };
            if let Err(err) = inner.set(&key, value, expiration).await {
                on_failure.report("read-through write-back", &key, &err);
            }
        });
    }
}

fn spawn_write_back<C: Cache + 'static>(
    inner: Arc<C>,
    key: String,
    value: Bytes,
    expiration: Option<Duration>,
    on_failure: BackgroundFailure,
) {
    tokio::spawn(async move {
        if let Err(err) = inner.set(&key, value, expiration).await {
            on_failure.report("read-through write-back", &key, &err);
        }
    });
}

#[async_trait]
impl<C, L> Cache for ReadThrough<C, L>
where
    C: Cache + 'static,
    L: Loader + 'static,
{
    async fn get(&self, key: &str) -> Result<Bytes> {
        match self.inner.get(key).await {
            Err(err) if err.is_not_found() => {
                debug!(key, mode = ?self.mode, "Cache miss, loading");
                match self.mode {
                    ReadMode::Sync => self.load_sync(key).await,
                    ReadMode::SemiAsync => self.load_semi_async(key).await,
                    ReadMode::Async => {
                        self.load_async(key);
                        Err(err)
                    }
                }
            }
            other => other,
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        self.inner.set(key, value, ttl).await
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LocalCache, RemoteCache};
    use crate::remote::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Cache that misses every read and rejects every write.
    struct ReadOnlyMiss;

    #[async_trait]
    impl Cache for ReadOnlyMiss {
        async fn get(&self, key: &str) -> Result<Bytes> {
            Err(CacheError::KeyNotFound(key.to_string()))
        }

        async fn set(&self, key: &str, _value: Bytes, _ttl: Option<Duration>) -> Result<()> {
            Err(CacheError::CacheWriteFailed(key.to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }

        async fn load_and_delete(&self, key: &str) -> Result<Bytes> {
            Err(CacheError::KeyNotFound(key.to_string()))
        }

        fn on_evicted(&self, _callback: EvictionCallback) {}
    }

    /// Cache whose backend cannot be reached.
    struct Unreachable;

    #[async_trait]
    impl Cache for Unreachable {
        async fn get(&self, _key: &str) -> Result<Bytes> {
            Err(CacheError::Store("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: Bytes, _ttl: Option<Duration>) -> Result<()> {
            Err(CacheError::Store("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Err(CacheError::Store("connection refused".into()))
        }

        async fn load_and_delete(&self, _key: &str) -> Result<Bytes> {
            Err(CacheError::Store("connection refused".into()))
        }

        fn on_evicted(&self, _callback: EvictionCallback) {}
    }

    fn answer(_key: String) -> impl std::future::Future<Output = Result<Bytes>> + Send {
        async { Ok(Bytes::from_static(b"42")) }
    }

    async fn eventually_cached<C: Cache>(cache: &C, key: &str) -> Bytes {
        for _ in 0..100 {
            if let Ok(value) = cache.get(key).await {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{key} was never written back");
    }

    #[tokio::test]
    async fn test_sync_miss_loads_and_writes_back() {
        let cache = ReadThrough::new(LocalCache::default(), answer, Some(Duration::from_secs(60)));

        assert_eq!(cache.get("x").await.unwrap(), Bytes::from_static(b"42"));
        assert_eq!(cache.inner().get("x").await.unwrap(), Bytes::from_static(b"42"));
    }

    #[tokio::test]
    async fn test_hit_skips_loader() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let loader = move |_key: String| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, CacheError>(Bytes::from_static(b"loaded")) }
        };
        let cache = ReadThrough::new(LocalCache::default(), loader, None);
        cache.set("k", Bytes::from_static(b"cached"), None).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Bytes::from_static(b"cached"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_load_failure_is_returned_unwrapped() {
        let loader = |key: String| async move {
            Err::<Bytes, _>(CacheError::Load(format!("{key}: source down")))
        };
        let cache = ReadThrough::new(LocalCache::default(), loader, None);

        let err = cache.get("x").await.unwrap_err();
        assert!(matches!(err, CacheError::Load(_)));
        assert!(cache.inner().get("x").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_write_back_failure_carries_value() {
        let cache = ReadThrough::new(ReadOnlyMiss, answer, None);

        match cache.get("x").await.unwrap_err() {
            CacheError::RefreshCacheFailed { key, value, .. } => {
                assert_eq!(key, "x");
                assert_eq!(value, Bytes::from_static(b"42"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_semi_async_returns_value_then_caches() {
        let cache = ReadThrough::new(RemoteCache::new(MemoryStore::new()), answer, None)
            .with_mode(ReadMode::SemiAsync);

        assert_eq!(cache.get("x").await.unwrap(), Bytes::from_static(b"42"));
        assert_eq!(eventually_cached(cache.inner(), "x").await, Bytes::from_static(b"42"));
    }

    #[tokio::test]
    async fn test_semi_async_hides_write_back_failure() {
        let cache = ReadThrough::new(ReadOnlyMiss, answer, None).with_mode(ReadMode::SemiAsync);

        assert_eq!(cache.get("x").await.unwrap(), Bytes::from_static(b"42"));
    }

    #[tokio::test]
    async fn test_async_misses_then_fills_in_background() {
        let cache = ReadThrough::new(LocalCache::default(), answer, None).with_mode(ReadMode::Async);

        assert!(cache.get("x").await.unwrap_err().is_not_found());
        assert_eq!(eventually_cached(cache.inner(), "x").await, Bytes::from_static(b"42"));
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let loader = move |_key: String| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, CacheError>(Bytes::from_static(b"unused")) }
        };
        let cache = ReadThrough::new(Unreachable, loader, None);

        assert!(matches!(cache.get("x").await.unwrap_err(), CacheError::Store(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
