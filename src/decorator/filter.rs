//! Existence-filter gate in front of a loader.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::cache::Cache;
use crate::decorator::{ExistenceFilter, Loader, ReadThrough};
use crate::error::{CacheError, Result};

/// Loader that consults `filter` first and resolves keys it rules out as
/// `KeyNotFound` without touching the source.
pub struct FilteredLoader<F, L> {
    filter: F,
    loader: L,
}

impl<F: ExistenceFilter, L: Loader> FilteredLoader<F, L> {
    pub fn new(filter: F, loader: L) -> Self {
        Self { filter, loader }
    }
}

#[async_trait]
impl<F: ExistenceFilter, L: Loader> Loader for FilteredLoader<F, L> {
    async fn load(&self, key: &str) -> Result<Bytes> {
        if !self.filter.may_contain(key).await {
            debug!(key, "Filter rules key out, skipping load");
            return Err(CacheError::KeyNotFound(key.to_string()));
        }
        self.loader.load(key).await
    }
}

/// Read-through cache whose loads are gated by an existence filter.
pub type FilteredCache<C, F, L> = ReadThrough<C, FilteredLoader<F, L>>;

pub fn filtered_cache<C, F, L>(
    inner: C,
    filter: F,
    loader: L,
    expiration: Option<Duration>,
) -> FilteredCache<C, F, L>
where
    C: Cache + 'static,
    F: ExistenceFilter + 'static,
    L: Loader + 'static,
{
    ReadThrough::new(inner, FilteredLoader::new(filter, loader), expiration)
}
