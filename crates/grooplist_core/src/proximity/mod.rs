//! Store proximity evaluation.
//!
//! # Responsibility
//! - Compute great-circle distances between samples and points of interest.
//! - Decide which points trigger a "member is nearby" notification.
//!
//! # Invariants
//! - Decision logic never performs delivery; events go to a sink.

pub mod distance;
pub mod notifier;
