//! Integration Tests for Composed Cache Stacks
//!
//! Exercises decorators layered over the in-process and remote stores
//! through the public API only.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use layercache::cache::{Cache, LocalCache, LocalCacheConfig, RemoteCache};
use layercache::decorator::{
    filtered_cache, singleflight_cache, MaxCountLimiter, MaxMemoryLimiter, ReadMode, ReadThrough,
    WriteThrough,
};
use layercache::{CacheError, ErrorKind, MemoryStore};
use parking_lot::Mutex;
use tokio_test::{assert_err, assert_ok};

// == Helper Functions ==

fn local() -> LocalCache {
    LocalCache::new(LocalCacheConfig {
        sweep_interval: Duration::from_millis(20),
        ..Default::default()
    })
}

type LoadFuture = Pin<Box<dyn Future<Output = layercache::Result<Bytes>> + Send>>;

fn counting_loader(
    calls: Arc<AtomicUsize>,
    delay: Duration,
) -> impl Fn(String) -> LoadFuture + Send + Sync + 'static {
    move |key: String| -> LoadFuture {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(Bytes::from(format!("loaded:{key}")))
        })
    }
}

// == Basic Contract ==

#[tokio::test]
async fn test_value_without_ttl_lives_until_deleted() {
    let cache = local();
    assert_ok!(cache.set("k", Bytes::from_static(b"v1"), None).await);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(assert_ok!(cache.get("k").await), Bytes::from_static(b"v1"));

    assert_ok!(cache.delete("k").await);
    let err = assert_err!(cache.get("k").await);
    assert_eq!(err.kind(), ErrorKind::KeyNotFound);
}

#[tokio::test]
async fn test_background_sweep_fires_hooks() {
    let cache = local();
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let sink = evicted.clone();
    cache.on_evicted(Arc::new(move |key: &str, _: &Bytes| sink.lock().push(key.to_string())));

    cache
        .set("short", Bytes::from_static(b"v"), Some(Duration::from_millis(5)))
        .await
        .unwrap();
    cache.set("long", Bytes::from_static(b"v"), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*evicted.lock(), vec!["short".to_string()]);
    assert_eq!(cache.len(), 1);
}

// == Read Through ==

#[tokio::test]
async fn test_read_through_writes_back_to_remote_store() {
    let store = Arc::new(MemoryStore::new());
    let loader = |_key: String| async { Ok::<_, CacheError>(Bytes::from_static(b"42")) };
    let cache = ReadThrough::new(RemoteCache::new(store.clone()), loader, None);

    assert_eq!(cache.get("x").await.unwrap(), Bytes::from_static(b"42"));

    let direct = RemoteCache::new(store);
    assert_eq!(direct.get("x").await.unwrap(), Bytes::from_static(b"42"));
}

#[tokio::test]
async fn test_read_through_respects_expiration() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = ReadThrough::new(
        local(),
        counting_loader(calls.clone(), Duration::ZERO),
        Some(Duration::from_millis(20)),
    );

    cache.get("k").await.unwrap();
    cache.get("k").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(40)).await;
    cache.get("k").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_async_read_through_eventually_serves_hits() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = ReadThrough::new(local(), counting_loader(calls.clone(), Duration::ZERO), None)
        .with_mode(ReadMode::Async);

    assert!(cache.get("k").await.unwrap_err().is_not_found());

    let mut value = None;
    for _ in 0..100 {
        if let Ok(found) = cache.get("k").await {
            value = Some(found);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(value, Some(Bytes::from_static(b"loaded:k")));
}

// == Singleflight ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_singleflight_collapses_concurrent_misses() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(singleflight_cache(
        local(),
        counting_loader(calls.clone(), Duration::from_millis(100)),
        None,
    ));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move { cache.get("hot").await }));
    }

    let mut results = HashSet::new();
    for handle in handles {
        results.insert(handle.await.unwrap().unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results.len(), 1);
    assert!(results.contains(&Bytes::from_static(b"loaded:hot")));
}

// == Existence Filter ==

#[tokio::test]
async fn test_filter_shields_loader_from_unknown_keys() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = filtered_cache(
        local(),
        |key: &str| key.starts_with("user:"),
        counting_loader(calls.clone(), Duration::ZERO),
        None,
    );

    for i in 0..10 {
        assert!(cache.get(&format!("bot:{i}")).await.unwrap_err().is_not_found());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(cache.get("user:7").await.unwrap(), Bytes::from_static(b"loaded:user:7"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// == Limiters ==

#[tokio::test]
async fn test_count_limiter_under_read_through() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = ReadThrough::new(
        MaxCountLimiter::new(local(), 2),
        counting_loader(calls.clone(), Duration::ZERO),
        None,
    );

    cache.get("a").await.unwrap();
    cache.get("b").await.unwrap();

    match cache.get("c").await.unwrap_err() {
        CacheError::RefreshCacheFailed { key, value, .. } => {
            assert_eq!(key, "c");
            assert_eq!(value, Bytes::from_static(b"loaded:c"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cache.inner().count(), 2);
}

#[tokio::test]
async fn test_memory_limiter_evicts_in_lru_order() {
    let cache = MaxMemoryLimiter::new(local(), 12);
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let sink = evicted.clone();
    cache.on_evicted(Arc::new(move |key: &str, _: &Bytes| sink.lock().push(key.to_string())));

    for key in ["a", "b", "c"] {
        cache.set(key, Bytes::from(vec![0u8; 4]), None).await.unwrap();
    }
    cache.get("a").await.unwrap();
    cache.set("d", Bytes::from(vec![0u8; 8]), None).await.unwrap();

    assert_eq!(*evicted.lock(), vec!["b".to_string(), "c".to_string()]);
    assert_eq!(cache.keys(), vec!["a", "d"]);
    assert_eq!(cache.used_bytes(), 12);
}

// == Write Through ==

#[tokio::test]
async fn test_write_through_persists_and_caches() {
    let persisted = Arc::new(Mutex::new(Vec::new()));
    let sink = persisted.clone();
    let persister = move |key: String, value: Bytes, _ttl: Option<Duration>| {
        sink.lock().push((key, value));
        async { Ok::<_, CacheError>(()) }
    };
    let cache = WriteThrough::new(local(), persister);

    cache.set("k", Bytes::from_static(b"v"), None).await.unwrap();

    assert_eq!(cache.get("k").await.unwrap(), Bytes::from_static(b"v"));
    assert_eq!(
        *persisted.lock(),
        vec![("k".to_string(), Bytes::from_static(b"v"))]
    );
}
