//! Flutter bridge for GroopList core.

pub mod api;
