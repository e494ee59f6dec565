//! # cadhub-entity
//!
//! Domain entities for CadHub. A [`job::Job`] is the unit tracked from
//! submission to a terminal state; every state change goes through
//! [`job::Job::apply`], which enforces the lifecycle rules.

pub mod job;
