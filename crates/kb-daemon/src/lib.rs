//! kb-daemon library target.
//!
//! Exposes the router, state and backend for integration tests.
//! The binary `main.rs` depends on this library target.

pub mod api_types;
pub mod backend;
pub mod routes;
pub mod state;
