//! Run configuration and relationship propagation for algorithm data packages.
//!
//! A data package declares algorithms (typed input/output signatures plus
//! relationship rules) and holds runs: named, configurable instantiations of
//! one algorithm. Setting a variable evaluates the relationship declared for
//! it and cascades the effects to other variables and resources; the whole
//! change is committed atomically or not at all.
//!
//! - **[`core`]**: Pure logic (data model, validation, propagation, lifecycle).
//!   No I/O.
//! - **[`io`]**: Side effects (package files, atomic writes, settings,
//!   snapshots, the container backend).
//!
//! Orchestration modules ([`create`], [`select`], [`mutate`], [`execute`],
//! [`reset`], [`validate`]) combine the two and back the CLI commands. Every
//! operation takes an explicit [`io::run_store::RunContext`] or package paths;
//! the active run is ordinary state in `.opends/config.json`.
//!
//! # Concurrency
//!
//! A package is assumed to have a single writer. There is no locking:
//! concurrent invocations against the same package are unsupported and their
//! outcome is undefined.

pub mod core;
pub mod create;
pub mod error;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod mutate;
pub mod reset;
pub mod select;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;

pub use error::{Error, Result};
