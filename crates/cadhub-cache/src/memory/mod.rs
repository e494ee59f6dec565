//! In-process job store and queue.

pub mod queue;
pub mod store;

pub use queue::MemoryJobQueue;
pub use store::MemoryJobStore;
