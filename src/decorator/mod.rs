//! Decorator Module
//!
//! Wrappers that take a [`Cache`](crate::cache::Cache) and produce a
//! `Cache`, layering load-on-miss, persistence, deduplication, existence
//! filtering and capacity bounds onto any backing store.

mod filter;
mod max_count;
mod max_memory;
mod read_through;
mod singleflight;
mod write_through;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::error;

use crate::error::{CacheError, Result};

pub use filter::{filtered_cache, FilteredCache, FilteredLoader};
pub use max_count::MaxCountLimiter;
pub use max_memory::MaxMemoryLimiter;
pub use read_through::{ReadMode, ReadThrough};
pub use singleflight::{singleflight_cache, SingleflightCache, SingleflightLoader};
pub use write_through::{WriteMode, WriteThrough};

// == Loader ==
/// Upstream source consulted on a cache miss.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, key: &str) -> Result<Bytes>;
}

#[async_trait]
impl<F, Fut> Loader for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Bytes>> + Send + 'static,
{
    async fn load(&self, key: &str) -> Result<Bytes> {
        (self)(key.to_string()).await
    }
}

// == Persister ==
/// Durable sink written alongside the cache.
#[async_trait]
pub trait Persister: Send + Sync {
    async fn persist(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()>;
}

#[async_trait]
impl<F, Fut> Persister for F
where
    F: Fn(String, Bytes, Option<Duration>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn persist(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        (self)(key.to_string(), value, ttl).await
    }
}

// == Existence Filter ==
/// Membership test for keys the source may hold.
///
/// `false` must mean "definitely absent"; false positives are allowed.
#[async_trait]
pub trait ExistenceFilter: Send + Sync {
    async fn may_contain(&self, key: &str) -> bool;
}

#[async_trait]
impl<F> ExistenceFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    async fn may_contain(&self, key: &str) -> bool {
        (self)(key)
    }
}

// == Background Failure ==
/// What a detached background write does when it fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackgroundFailure {
    /// Log the failure and carry on
    #[default]
    Log,
    /// Log the failure and terminate the process with status 1
    Exit,
}

impl BackgroundFailure {
    pub(crate) fn report(self, operation: &str, key: &str, err: &CacheError) {
        error!(operation, key, error = %err, "Background write failed");
        if self == BackgroundFailure::Exit {
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closures_implement_seams() {
        let loader = |key: String| async move { Ok::<_, CacheError>(Bytes::from(key.into_bytes())) };
        assert_eq!(loader.load("abc").await.unwrap(), Bytes::from_static(b"abc"));

        let persister =
            |_key: String, _value: Bytes, _ttl: Option<Duration>| async { Ok::<_, CacheError>(()) };
        persister.persist("k", Bytes::new(), None).await.unwrap();

        let filter = |key: &str| key.starts_with("user:");
        assert!(filter.may_contain("user:1").await);
        assert!(!filter.may_contain("order:1").await);
    }

    #[test]
    fn test_default_background_failure_logs() {
        assert_eq!(BackgroundFailure::default(), BackgroundFailure::Log);
    }
}
