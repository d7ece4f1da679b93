//! Scratchpost: test case management backend.
//!
//! The binary in `main.rs` wires these modules together; integration tests
//! in `tests/` drive [`api::app`] directly.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod identity;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod query;
pub mod state;
pub mod store;

pub use state::AppState;
