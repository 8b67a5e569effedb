//! Persistence and process plumbing for package operations.

pub mod algorithm_store;
pub mod config;
pub mod executor;
pub mod json;
pub mod package;
pub mod paths;
pub mod process;
pub mod run_state;
pub mod run_store;
pub mod snapshot;
