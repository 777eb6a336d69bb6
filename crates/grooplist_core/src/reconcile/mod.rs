//! Reconciliation of optimistic local state with authoritative snapshots.

pub mod list;
