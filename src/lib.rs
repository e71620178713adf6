//! Layercache - composable caches and distributed leases
//!
//! A single [`Cache`] contract over an in-process store and a remote
//! key-value store, decorators that add read/write-through, load
//! deduplication, existence filtering and capacity bounds, and a lease-based
//! distributed lock built on the remote store's atomic scripts.

pub mod cache;
pub mod config;
pub mod decorator;
pub mod error;
pub mod lock;
pub mod remote;
pub mod retry;
pub mod singleflight;
mod tasks;

pub use cache::{Cache, CheckedSet, EvictionCallback, LocalCache, RemoteCache};
pub use config::Config;
pub use error::{CacheError, ErrorKind, Result};
pub use lock::{Lock, LockClient, LockState, RefreshPolicy};
pub use remote::{MemoryStore, RedisStore, RemoteStore};
pub use retry::{ExponentialBackoff, FixedInterval, RetryStrategy};
