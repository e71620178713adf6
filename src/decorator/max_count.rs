//! Count-bounded limiter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::cache::{Cache, CheckedSet, EvictionCallback};
use crate::error::{CacheError, Result};

/// Rejects writes of new keys once `max_count` keys are stored.
///
/// Overwrites never change the count. Every removal from the inner store
/// decrements it through the eviction hook. Both the admission check and the
/// decrement run under the inner store's lock, so concurrent writers and
/// sweeps cannot skew the count.
pub struct MaxCountLimiter<C> {
    inner: C,
    max_count: usize,
    count: Arc<AtomicUsize>,
}

impl<C: CheckedSet> MaxCountLimiter<C> {
    /// Wraps `inner`, which should start empty: entries stored beforehand
    /// are not counted.
    pub fn new(inner: C, max_count: usize) -> Self {
        let count = Arc::new(AtomicUsize::new(0));
        let tracked = Arc::clone(&count);
        inner.on_evicted(Arc::new(move |key: &str, _: &Bytes| {
            if tracked
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
            {
                debug!(key, "Removed an entry the limiter never counted");
            }
        }));

        Self {
            inner,
            max_count,
            count,
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: CheckedSet> Cache for MaxCountLimiter<C> {
    async fn get(&self, key: &str) -> Result<Bytes> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let max_count = self.max_count;
        let count = &self.count;
        self.inner.set_checked(key, value, ttl, &mut |exists| {
            if exists {
                return Ok(());
            }
            if count.load(Ordering::SeqCst) >= max_count {
                return Err(CacheError::OverCapacity(format!(
                    "{key}: {max_count} entries stored"
                )));
            }
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
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
