//! Route handlers.

pub mod convert;
pub mod health;
pub mod status;
