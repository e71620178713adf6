//! Singleflight Module
//!
//! Collapses concurrent calls for the same key into one in-flight execution.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

// == Group ==
/// Deduplicates concurrent work per key.
///
/// The registration for a key is removed as soon as its work completes, so a
/// call arriving afterwards starts a fresh execution instead of reusing a
/// stale result. If the executing caller is dropped mid-flight, one of the
/// waiters takes over and runs its own work.
pub struct Group<T> {
    calls: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T> Default for Group<T> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> Group<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` unless a call for `key` is already in flight, in which case
    /// the in-flight result is awaited instead.
    ///
    /// Returns the result and whether this caller executed the work.
    pub async fn work<F, Fut>(&self, key: &str, work: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut calls = self.calls.lock();
            Arc::clone(
                calls
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let cell_ref = &cell;
        let mut leader = false;
        let value = cell
            .get_or_init(|| {
                leader = true;
                let fut = work();
                async move {
                    let value = fut.await;
                    // Unregister before waiters are released.
                    self.forget(key, cell_ref);
                    value
                }
            })
            .await
            .clone();

        (value, leader)
    }

    /// Number of keys with work in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    fn forget(&self, key: &str, cell: &Arc<OnceCell<T>>) {
        let mut calls = self.calls.lock();
        if calls.get(key).is_some_and(|current| Arc::ptr_eq(current, cell)) {
            calls.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_execution() {
        let group = Arc::new(Group::<u32>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let group = group.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                group
                    .work("k", || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        7
                    })
                    .await
            }));
        }

        let mut leaders = 0;
        for handle in handles {
            let (value, leader) = handle.await.unwrap();
            assert_eq!(value, 7);
            if leader {
                leaders += 1;
            }
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(leaders, 1);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_run_fresh() {
        let group = Group::<u32>::new();
        let (first, leader1) = group.work("k", || async { 1 }).await;
        let (second, leader2) = group.work("k", || async { 2 }).await;
        assert_eq!((first, second), (1, 2));
        assert!(leader1 && leader2);
    }

    #[tokio::test]
    async fn test_different_keys_run_independently() {
        let group = Arc::new(Group::<&'static str>::new());
        let g1 = group.clone();
        let g2 = group.clone();
        let a = tokio::spawn(async move {
            g1.work("a", || async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                "a"
            })
            .await
        });
        let b = tokio::spawn(async move {
            g2.work("b", || async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                "b"
            })
            .await
        });
        assert_eq!(a.await.unwrap(), ("a", true));
        assert_eq!(b.await.unwrap(), ("b", true));
    }
}
