//! In-process [`RemoteStore`].
//!
//! Keeps the remote contract's semantics without a server: every operation,
//! including the lock scripts, runs under one mutex so it is atomic. An
//! optional injected latency makes timeouts reproducible.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{CacheError, Result};
use crate::lock::{ACQUIRE_SCRIPT, EXTEND_SCRIPT, RELEASE_SCRIPT};
use crate::remote::{RemoteStore, Script};

struct StoredValue {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: deadline(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires| now < expires)
    }
}

fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    ttl.filter(|ttl| !ttl.is_zero()).map(|ttl| Instant::now() + ttl)
}

fn parse_ttl(arg: Option<&String>) -> Result<Duration> {
    arg.and_then(|ms| ms.parse::<u64>().ok())
        .map(Duration::from_millis)
        .ok_or_else(|| CacheError::Store("script: invalid ttl argument".to_string()))
}

/// Server-less store with remote semantics.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    latency: Mutex<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every subsequent operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Remaining lifetime of a live key. `Some(None)` means no expiry.
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|stored| stored.is_live(now))
            .map(|stored| stored.expires_at.map(|at| at.saturating_duration_since(now)))
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// Runs `f` on the live-entry view of the map.
    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, StoredValue>) -> T) -> T {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, stored| stored.is_live(now));
        f(&mut entries)
    }

    fn acquire(&self, key: &str, token: &str, ttl: Duration) -> i64 {
        self.with_entries(|entries| match entries.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(StoredValue::new(
                    Bytes::copy_from_slice(token.as_bytes()),
                    Some(ttl),
                ));
                1
            }
            Entry::Occupied(mut slot) if slot.get().value == token.as_bytes() => {
                slot.get_mut().expires_at = deadline(Some(ttl));
                1
            }
            Entry::Occupied(_) => 0,
        })
    }

    fn release(&self, key: &str, token: &str) -> i64 {
        self.with_entries(|entries| {
            let owned = entries
                .get(key)
                .is_some_and(|stored| stored.value == token.as_bytes());
            if owned {
                entries.remove(key);
            }
            i64::from(owned)
        })
    }

    fn extend(&self, key: &str, token: &str, ttl: Duration) -> i64 {
        self.with_entries(|entries| match entries.get_mut(key) {
            Some(stored) if stored.value == token.as_bytes() => {
                stored.expires_at = deadline(Some(ttl));
                1
            }
            _ => 0,
        })
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.simulate_latency().await;
        Ok(self.with_entries(|entries| entries.get(key).map(|stored| stored.value.clone())))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<String> {
        self.simulate_latency().await;
        self.with_entries(|entries| entries.insert(key.to_string(), StoredValue::new(value, ttl)));
        Ok("OK".to_string())
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        self.simulate_latency().await;
        Ok(self.with_entries(|entries| u64::from(entries.remove(key).is_some())))
    }

    async fn get_del(&self, key: &str) -> Result<Option<Bytes>> {
        self.simulate_latency().await;
        Ok(self.with_entries(|entries| entries.remove(key).map(|stored| stored.value)))
    }

    async fn eval(&self, script: &Script, keys: &[&str], args: &[String]) -> Result<i64> {
        self.simulate_latency().await;
        let key = keys
            .first()
            .ok_or_else(|| CacheError::Store("script: missing key".to_string()))?;
        let token = args
            .first()
            .ok_or_else(|| CacheError::Store("script: missing token".to_string()))?;

        if script.name() == ACQUIRE_SCRIPT.name() {
            Ok(self.acquire(key, token, parse_ttl(args.get(1))?))
        } else if script.name() == RELEASE_SCRIPT.name() {
            Ok(self.release(key, token))
        } else if script.name() == EXTEND_SCRIPT.name() {
            Ok(self.extend(key, token, parse_ttl(args.get(1))?))
        } else {
            Err(CacheError::Store(format!(
                "script: unsupported script {}",
                script.name()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(token: &str, ttl_ms: u64) -> Vec<String> {
        vec![token.to_string(), ttl_ms.to_string()]
    }

    #[tokio::test]
    async fn test_basic_commands() {
        let store = MemoryStore::new();

        assert_eq!(store.set("k", Bytes::from_static(b"v"), None).await.unwrap(), "OK");
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
        assert_eq!(store.get_del("k").await.unwrap(), Some(Bytes::from_static(b"v")));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.delete("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_values_expire() {
        let store = MemoryStore::new();

        store
            .set("k", Bytes::from_static(b"v"), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_acquire_release_extend() {
        let store = MemoryStore::new();

        assert_eq!(store.eval(&ACQUIRE_SCRIPT, &["lock"], &args("a", 1000)).await.unwrap(), 1);
        assert_eq!(store.eval(&ACQUIRE_SCRIPT, &["lock"], &args("b", 1000)).await.unwrap(), 0);
        // Same token re-acquires.
        assert_eq!(store.eval(&ACQUIRE_SCRIPT, &["lock"], &args("a", 1000)).await.unwrap(), 1);

        assert_eq!(store.eval(&EXTEND_SCRIPT, &["lock"], &args("b", 5000)).await.unwrap(), 0);
        assert_eq!(store.eval(&EXTEND_SCRIPT, &["lock"], &args("a", 5000)).await.unwrap(), 1);
        assert!(store.ttl("lock").unwrap().unwrap() > Duration::from_secs(4));

        assert_eq!(store.eval(&RELEASE_SCRIPT, &["lock"], &args("b", 0)).await.unwrap(), 0);
        assert_eq!(store.eval(&RELEASE_SCRIPT, &["lock"], &args("a", 0)).await.unwrap(), 1);
        assert!(store.ttl("lock").is_none());
    }

    #[tokio::test]
    async fn test_unknown_script_is_rejected() {
        let store = MemoryStore::new();
        let script = Script::new("bogus", "return 1");

        let err = store.eval(&script, &["k"], &args("a", 1)).await.unwrap_err();
        assert!(matches!(err, CacheError::Store(_)));
    }
}
