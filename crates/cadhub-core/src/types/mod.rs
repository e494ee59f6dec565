//! Shared value types.

pub mod id;
