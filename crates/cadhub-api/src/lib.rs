//! # cadhub-api
//!
//! HTTP API layer for CadHub built on Axum.
//!
//! Exposes conversion submission, status polling, result download, and
//! health endpoints, with CORS, request logging, and error mapping.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::AppState;
