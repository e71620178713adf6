//! Lease handle for a held lock.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{CacheError, Result};
use crate::lock::scripts::{EXTEND_SCRIPT, RELEASE_SCRIPT};
use crate::remote::RemoteStore;

/// Consecutive refresh timeouts tolerated before a lease is given up.
pub const DEFAULT_MAX_REFRESH_TIMEOUTS: u32 = 3;

// == Lock State ==
/// Lifecycle of a lock handle. A handle never returns to `Held`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Held,
    Released,
    Failed,
}

// == Refresh Policy ==
/// Settings for [`Lock::auto_refresh_with`].
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    /// Time between scheduled refreshes
    pub interval: Duration,
    /// Deadline for one refresh call
    pub timeout: Duration,
    /// Timeouts in a row after which the lease is declared lost
    pub max_consecutive_timeouts: u32,
}

impl RefreshPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            max_consecutive_timeouts: DEFAULT_MAX_REFRESH_TIMEOUTS,
        }
    }
}

// == Lock ==
/// A held lease on `key`, valid while the store still maps `key` to this
/// handle's token.
///
/// Clones share the same lease.
#[derive(Clone)]
pub struct Lock {
    inner: Arc<LockInner>,
}

struct LockInner {
    store: Arc<dyn RemoteStore>,
    key: String,
    token: String,
    ttl: Duration,
    stop: CancellationToken,
    state: Mutex<LockState>,
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock")
            .field("key", &self.inner.key)
            .field("token", &self.inner.token)
            .field("ttl", &self.inner.ttl)
            .field("state", &self.state())
            .finish()
    }
}

impl Lock {
    pub(crate) fn new(store: Arc<dyn RemoteStore>, key: &str, token: String, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(LockInner {
                store,
                key: key.to_string(),
                token,
                ttl,
                stop: CancellationToken::new(),
                state: Mutex::new(LockState::Held),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The fencing token written at acquisition.
    pub fn token(&self) -> &str {
        &self.inner.token
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn state(&self) -> LockState {
        *self.inner.state.lock()
    }

    fn mark(&self, next: LockState) {
        let mut state = self.inner.state.lock();
        if *state == LockState::Held {
            *state = next;
        }
    }

    fn not_held(&self) -> CacheError {
        self.mark(LockState::Failed);
        CacheError::LockNotHeld(self.inner.key.clone())
    }

    // == Unlock ==
    /// Releases the lease if the store still holds this token.
    ///
    /// Returns `LockNotHeld` if the lease expired or was taken over; the new
    /// holder's record is left untouched. Any running auto-refresh loop is
    /// stopped whatever the outcome.
    pub async fn unlock(&self) -> Result<()> {
        let _stop_refresh = self.inner.stop.clone().drop_guard();

        let released = self
            .inner
            .store
            .eval(&RELEASE_SCRIPT, &[self.inner.key.as_str()], &[self.inner.token.clone()])
            .await?;
        if released != 1 {
            return Err(self.not_held());
        }

        self.mark(LockState::Released);
        debug!(key = %self.inner.key, "Lock released");
        Ok(())
    }

    // == Refresh ==
    /// Extends the lease by its original TTL if this token still holds it.
    pub async fn refresh(&self) -> Result<()> {
        let extended = self
            .inner
            .store
            .eval(
                &EXTEND_SCRIPT,
                &[self.inner.key.as_str()],
                &[self.inner.token.clone(), ttl_millis(self.inner.ttl).to_string()],
            )
            .await?;
        if extended != 1 {
            return Err(self.not_held());
        }
        Ok(())
    }

    /// Stops a running auto-refresh loop without releasing the lease.
    pub fn stop_refresh(&self) {
        self.inner.stop.cancel();
    }

    // == Auto Refresh ==
    /// Refreshes the lease every `interval` until stopped.
    ///
    /// See [`auto_refresh_with`](Self::auto_refresh_with).
    pub async fn auto_refresh(&self, interval: Duration, timeout: Duration) -> Result<()> {
        self.auto_refresh_with(RefreshPolicy::new(interval, timeout))
            .await
    }

    /// Refreshes the lease on every tick until `unlock` or `stop_refresh`.
    ///
    /// A refresh that times out is retried immediately instead of waiting
    /// for the next tick. After `max_consecutive_timeouts` timeouts in a row
    /// the lease is given up with `RetriesExhausted`. Any other refresh error
    /// ends the loop and is returned.
    pub async fn auto_refresh_with(&self, policy: RefreshPolicy) -> Result<()> {
        let stop = &self.inner.stop;
        let max_timeouts = policy.max_consecutive_timeouts.max(1);
        let mut ticker = interval_at(Instant::now() + policy.interval, policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut timeouts = 0u32;

        loop {
            tokio::select! {
                _ = stop.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            loop {
                let outcome = tokio::select! {
                    _ = stop.cancelled() => return Ok(()),
                    outcome = tokio::time::timeout(policy.timeout, self.refresh()) => outcome,
                };

                match outcome {
                    Ok(Ok(())) => {
                        timeouts = 0;
                        break;
                    }
                    Ok(Err(CacheError::Timeout)) | Err(_) => {
                        timeouts += 1;
                        warn!(key = %self.inner.key, timeouts, "Lease refresh timed out");
                        if timeouts >= max_timeouts {
                            self.mark(LockState::Failed);
                            return Err(CacheError::RetriesExhausted(format!(
                                "{}: {} consecutive refresh timeouts",
                                self.inner.key, timeouts
                            )));
                        }
                    }
                    Ok(Err(err)) => {
                        error!(key = %self.inner.key, error = %err, "Lease refresh failed");
                        self.mark(LockState::Failed);
                        return Err(err);
                    }
                }
            }
        }
    }
}

/// Milliseconds for a script TTL argument, never zero.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}
