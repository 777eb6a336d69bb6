//! Household use-case services.
//!
//! # Responsibility
//! - Orchestrate document store, reconciler and device capabilities into
//!   use-case level APIs.
//! - Take the `SessionContext` explicitly on every call; no service keeps
//!   ambient session state.

pub mod list_service;
pub mod location_service;
pub mod membership_service;
pub mod notification_service;
pub mod session_service;
