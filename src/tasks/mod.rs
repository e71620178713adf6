//! Background Tasks Module
//!
//! Long-lived tasks owned by cache instances.
//!
//! # Tasks
//! - TTL Sweep: Removes expired local cache entries at a fixed interval

mod sweep;

pub(crate) use sweep::spawn_sweep_task;
