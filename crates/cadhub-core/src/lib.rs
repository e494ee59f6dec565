//! # cadhub-core
//!
//! Core crate for the CadHub conversion service. Contains the unified
//! error system, configuration schemas, and typed identifiers.
//!
//! This crate has **no** internal dependencies on other CadHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
pub use types::id::JobId;
