//! # cadhub-cache
//!
//! Job store and job queue backends for CadHub. Two modes:
//!
//! - **memory**: in-process store using [dashmap](https://crates.io/crates/dashmap)
//!   and a `tokio` channel queue; only valid when the gateway and workers
//!   share one process
//! - **redis**: shared store and queue using the [redis](https://crates.io/crates/redis) crate
//!
//! The backend is selected at runtime based on configuration.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;
pub mod traits;

pub use provider::Broker;
pub use traits::{Delivery, JobQueue, JobStore};
