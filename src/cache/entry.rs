//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, Instant};

use bytes::Bytes;

// == Cache Entry ==
/// Represents a single cache entry with value and expiration.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: Bytes,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry with optional TTL.
    ///
    /// A zero TTL is treated the same as no TTL.
    pub fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        let expires_at = ttl
            .filter(|ttl| !ttl.is_zero())
            .map(|ttl| Instant::now() + ttl);

        Self { value, expires_at }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired once `now` reaches its expiration instant. Entries
    /// without TTL never expire.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}
