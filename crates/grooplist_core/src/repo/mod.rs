//! Repository layer over device-local persistence.
//!
//! # Responsibility
//! - Define the local key-value contract used to survive restarts.
//! - Keep SQL details out of session orchestration.
//!
//! # Invariants
//! - Nothing stored here is authoritative; the document store wins.

pub mod session_repo;
