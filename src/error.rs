//! Error types for caches, decorators and the distributed lock
//!
//! Provides unified error handling using thiserror. Every failure maps to a
//! closed [`ErrorKind`] so callers can branch on the kind of condition
//! instead of matching on message text.

use bytes::Bytes;
use thiserror::Error;

// == Error Kind ==
/// Closed set of conditions reported by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    KeyNotFound,
    OverCapacity,
    CacheWriteFailed,
    RefreshCacheFailed,
    LockPreemptFailed,
    LockNotHeld,
    RetriesExhausted,
    Cancelled,
    Timeout,
    AlreadyClosed,
    Store,
    Load,
}

impl ErrorKind {
    /// Human-readable description of the kind.
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::KeyNotFound => "cache: key not found",
            ErrorKind::OverCapacity => "cache: over capacity",
            ErrorKind::CacheWriteFailed => "cache: store rejected write",
            ErrorKind::RefreshCacheFailed => "cache: failed to refresh cache after load",
            ErrorKind::LockPreemptFailed => "lock: resource held by another owner",
            ErrorKind::LockNotHeld => "lock: lock not held",
            ErrorKind::RetriesExhausted => "lock: retries exhausted",
            ErrorKind::Cancelled => "operation cancelled",
            ErrorKind::Timeout => "operation timed out",
            ErrorKind::AlreadyClosed => "cache: already closed",
            ErrorKind::Store => "store error",
            ErrorKind::Load => "load error",
        }
    }
}

// == Cache Error Enum ==
/// Unified error type for caches and locks.
///
/// `Clone` so a single in-flight outcome can be handed to every waiter.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Key absent or logically expired
    #[error("cache: key not found: {0}")]
    KeyNotFound(String),

    /// Count or byte budget would be exceeded
    #[error("cache: over capacity: {0}")]
    OverCapacity(String),

    /// Store acknowledged the write with something other than success
    #[error("cache: store rejected write: {0}")]
    CacheWriteFailed(String),

    /// The load succeeded but writing it back failed. `value` is still usable.
    #[error("cache: failed to refresh cache for {key}: {reason}")]
    RefreshCacheFailed {
        key: String,
        value: Bytes,
        reason: String,
    },

    /// Someone else holds the resource
    #[error("lock: failed to preempt lock: {0}")]
    LockPreemptFailed(String),

    /// Unlock or refresh without a matching token
    #[error("lock: lock not held: {0}")]
    LockNotHeld(String),

    /// Acquisition gave up after the configured attempts
    #[error("lock: retries exhausted: {0}")]
    RetriesExhausted(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out")]
    Timeout,

    /// Second close of a store
    #[error("cache: already closed")]
    AlreadyClosed,

    /// Any other backend failure
    #[error("store error: {0}")]
    Store(String),

    /// Upstream source failure reported by a loader or persister
    #[error("load error: {0}")]
    Load(String),
}

impl CacheError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::KeyNotFound(_) => ErrorKind::KeyNotFound,
            CacheError::OverCapacity(_) => ErrorKind::OverCapacity,
            CacheError::CacheWriteFailed(_) => ErrorKind::CacheWriteFailed,
            CacheError::RefreshCacheFailed { .. } => ErrorKind::RefreshCacheFailed,
            CacheError::LockPreemptFailed(_) => ErrorKind::LockPreemptFailed,
            CacheError::LockNotHeld(_) => ErrorKind::LockNotHeld,
            CacheError::RetriesExhausted(_) => ErrorKind::RetriesExhausted,
            CacheError::Cancelled => ErrorKind::Cancelled,
            CacheError::Timeout => ErrorKind::Timeout,
            CacheError::AlreadyClosed => ErrorKind::AlreadyClosed,
            CacheError::Store(_) => ErrorKind::Store,
            CacheError::Load(_) => ErrorKind::Load,
        }
    }

    /// Returns true if this error is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// Returns true for a plain miss.
    pub fn is_not_found(&self) -> bool {
        self.is(ErrorKind::KeyNotFound)
    }
}

// == Conversions ==
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            CacheError::Timeout
        } else {
            CacheError::Store(err.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for CacheError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CacheError::Timeout
    }
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, CacheError>;
