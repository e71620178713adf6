//! Distributed Lock Module
//!
//! Lease-based mutual exclusion over a [`RemoteStore`](crate::remote::RemoteStore).
//! Every check-and-act step runs as one atomic script at the store; the
//! client only drives retry and refresh timers locally.

mod client;
mod lease;
mod scripts;

pub use client::LockClient;
pub use lease::{Lock, LockState, RefreshPolicy, DEFAULT_MAX_REFRESH_TIMEOUTS};
pub use scripts::{ACQUIRE_SCRIPT, EXTEND_SCRIPT, RELEASE_SCRIPT};
