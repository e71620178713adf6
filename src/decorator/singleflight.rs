//! Singleflight gate: concurrent misses for one key share a single load.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::cache::Cache;
use crate::decorator::{Loader, ReadThrough};
use crate::error::Result;
use crate::singleflight::Group;

/// Loader wrapper that runs at most one load per key at a time.
///
/// Every caller that arrives while a load is in flight receives that load's
/// outcome, value or error alike. Loads for different keys run in parallel.
pub struct SingleflightLoader<L> {
    loader: L,
    group: Group<Result<Bytes>>,
}

impl<L: Loader> SingleflightLoader<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            group: Group::new(),
        }
    }

    /// Keys with a load currently in flight.
    pub fn in_flight(&self) -> usize {
        self.group.in_flight()
    }
}

#[async_trait]
impl<L: Loader> Loader for SingleflightLoader<L> {
    async fn load(&self, key: &str) -> Result<Bytes> {
        let (outcome, leader) = self.group.work(key, || self.loader.load(key)).await;
        if !leader {
            debug!(key, "Joined in-flight load");
        }
        outcome
    }
}

/// Read-through cache whose loads are deduplicated per key.
pub type SingleflightCache<C, L> = ReadThrough<C, SingleflightLoader<L>>;

pub fn singleflight_cache<C, L>(
    inner: C,
    loader: L,
    expiration: Option<Duration>,
) -> SingleflightCache<C, L>
where
    C: Cache + 'static,
    L: Loader + 'static,
{
    ReadThrough::new(inner, SingleflightLoader::new(loader), expiration)
}
