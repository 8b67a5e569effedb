//! Deterministic, pure logic for the run configuration engine.
//!
//! Core modules are free of I/O. They operate on in-memory records and
//! return deterministic results suitable for tests.

pub mod algorithm;
pub mod lifecycle;
pub mod propagate;
pub mod relationship;
pub mod resource;
pub mod run;
pub mod value;
pub mod variable;
