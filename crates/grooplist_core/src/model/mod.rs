//! Domain model for households, grocery items, notifications and geography.
//!
//! # Responsibility
//! - Define canonical data structures used by reconciliation logic.
//! - Own the mapping between remote document shapes and domain records.
//!
//! # Invariants
//! - Remote identity is assigned by the document store; placeholders never
//!   leave the process.
//! - Notification records are append-only.

pub mod geo;
pub mod household;
pub mod item;
pub mod notification;
