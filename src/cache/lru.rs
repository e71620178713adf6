//! LRU Tracker Module
//!
//! Recency order used by the byte-budget limiter.

use std::collections::VecDeque;

// == LRU Tracker ==
/// Tracks access order for LRU eviction.
///
/// Keys are stored oldest-first:
/// - Front = Least recently used (evicted first)
/// - Back = Most recently used
///
/// Every tracked key appears exactly once.
#[derive(Debug, Default)]
pub struct LruTracker {
    order: VecDeque<String>,
}

impl LruTracker {
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Touch ==
    /// Marks a key as most recently used, adding it if untracked.
    pub fn touch(&mut self, key: &str) {
        self.remove(key);
        self.order.push_back(key.to_string());
    }

    // == Remove ==
    /// Removes a key from the tracker. Returns true if it was tracked.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.order.iter().position(|k| k == key) {
            Some(index) => {
                self.order.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns the least recently used key without removing it.
    pub fn oldest(&self) -> Option<&str> {
        self.order.front().map(String::as_str)
    }

    /// Removes and returns the least recently used key.
    pub fn pop_oldest(&mut self) -> Option<String> {
        self.order.pop_front()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_new() {
        let lru = LruTracker::new();
        assert!(lru.is_empty());
        assert_eq!(lru.oldest(), None);
    }

    #[test]
    fn test_touch_new_keys_keeps_insertion_order() {
        let mut lru = LruTracker::new();

        lru.touch("key1");
        lru.touch("key2");
        lru.touch("key3");

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.oldest(), Some("key1"));
    }

    #[test]
    fn test_touch_existing_key_moves_to_back() {
        let mut lru = LruTracker::new();

        lru.touch("a");
        lru.touch("b");
        lru.touch("c");
        lru.touch("a");

        assert_eq!(lru.keys().collect::<Vec<_>>(), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_pop_oldest() {
        let mut lru = LruTracker::new();

        lru.touch("key1");
        lru.touch("key2");

        assert_eq!(lru.pop_oldest(), Some("key1".to_string()));
        assert_eq!(lru.pop_oldest(), Some("key2".to_string()));
        assert_eq!(lru.pop_oldest(), None);
    }

    #[test]
    fn test_remove() {
        let mut lru = LruTracker::new();

        lru.touch("key1");
        lru.touch("key2");
        lru.touch("key3");

        assert!(lru.remove("key2"));
        assert!(!lru.remove("key2"));
        assert!(!lru.remove("nonexistent"));

        assert_eq!(lru.len(), 2);
        assert!(!lru.contains("key2"));
        assert!(lru.contains("key1"));
    }

    #[test]
    fn test_touch_same_key_multiple_times() {
        let mut lru = LruTracker::new();

        lru.touch("key1");
        lru.touch("key1");
        lru.touch("key1");

        assert_eq!(lru.len(), 1);
    }
}
