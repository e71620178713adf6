//! Lock client: acquisition with retry and in-process deduplication.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CacheError, Result};
use crate::lock::lease::{ttl_millis, Lock};
use crate::lock::scripts::ACQUIRE_SCRIPT;
use crate::remote::RemoteStore;
use crate::retry::RetryStrategy;
use crate::singleflight::Group;

// == Lock Client ==
/// Acquires leases on keys of a remote store.
pub struct LockClient {
    store: Arc<dyn RemoteStore>,
    acquisitions: Group<Result<Lock>>,
}

impl LockClient {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            acquisitions: Group::new(),
        }
    }

    async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let acquired = self
            .store
            .eval(
                &ACQUIRE_SCRIPT,
                &[key],
                &[token.to_string(), ttl_millis(ttl).to_string()],
            )
            .await?;
        Ok(acquired == 1)
    }

    // == Try Lock ==
    /// Makes a single acquisition attempt with a fresh token.
    ///
    /// Returns `LockPreemptFailed` if someone else holds `key`.
    pub async fn try_lock(&self, key: &str, ttl: Duration) -> Result<Lock> {
        let token = new_token();
        if !self.acquire(key, &token, ttl).await? {
            return Err(CacheError::LockPreemptFailed(key.to_string()));
        }
        debug!(key, "Lock acquired");
        Ok(Lock::new(self.store.clone(), key, token, ttl))
    }

    // == Lock ==
    /// Acquires `key`, retrying per `retry` until it succeeds.
    ///
    /// Every attempt is bounded by `attempt_timeout`; an attempt that times
    /// out counts as contended and is retried. Any other store error aborts
    /// at once. All attempts share one token, so an attempt that landed at
    /// the store after timing out here is picked up by the next one.
    ///
    /// # Errors
    /// - `RetriesExhausted` once `retry` stops
    /// - `Cancelled` when `cancel` fires, during an attempt or a sleep
    pub async fn lock<R: RetryStrategy>(
        &self,
        key: &str,
        ttl: Duration,
        attempt_timeout: Duration,
        mut retry: R,
        cancel: &CancellationToken,
    ) -> Result<Lock> {
        let token = new_token();
        // One timer, re-armed before every wait.
        let sleep = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(sleep);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let attempt = tokio::select! {
                _ = cancel.cancelled() => return Err(CacheError::Cancelled),
                attempt = tokio::time::timeout(attempt_timeout, self.acquire(key, &token, ttl)) => attempt,
            };

            match attempt {
                Ok(Ok(true)) => {
                    info!(key, attempts, "Lock acquired");
                    return Ok(Lock::new(self.store.clone(), key, token, ttl));
                }
                Ok(Ok(false)) => debug!(key, attempts, "Lock held elsewhere"),
                Ok(Err(CacheError::Timeout)) | Err(_) => {
                    debug!(key, attempts, "Lock attempt timed out")
                }
                Ok(Err(err)) => return Err(err),
            }

            let Some(interval) = retry.next() else {
                warn!(key, attempts, "Lock retries exhausted");
                return Err(CacheError::RetriesExhausted(format!(
                    "{key} after {attempts} attempts"
                )));
            };

            sleep.as_mut().reset(Instant::now() + interval);
            tokio::select! {
                _ = cancel.cancelled() => return Err(CacheError::Cancelled),
                _ = &mut sleep => {}
            }
        }
    }

    // == Singleflight Lock ==
    /// Like [`lock`](Self::lock), but concurrent callers in this process
    /// share one attempt sequence per key.
    ///
    /// Only the caller that ran the sequence receives its outcome; the others
    /// wait for it to finish and then start the next sequence, so at most one
    /// acquisition per key is in flight at a time.
    pub async fn singleflight_lock<R: RetryStrategy + Clone>(
        &self,
        key: &str,
        ttl: Duration,
        attempt_timeout: Duration,
        retry: R,
        cancel: &CancellationToken,
    ) -> Result<Lock> {
        loop {
            let round = self.acquisitions.work(key, || {
                self.lock(key, ttl, attempt_timeout, retry.clone(), cancel)
            });

            tokio::select! {
                _ = cancel.cancelled() => return Err(CacheError::Cancelled),
                (outcome, leader) = round => {
                    if leader {
                        return outcome;
                    }
                    debug!(key, "Shared acquisition finished, starting another");
                }
            }
        }
    }
}

fn new_token() -> String {
    Uuid::new_v4().to_string()
}
