//! Domain errors for package, run, and propagation operations.
//!
//! Every operation in the library returns [`Result`]. The binary converts
//! these into `anyhow::Error` and maps the variant back to a stable exit code
//! (see [`crate::exit_codes`]).

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the run configuration engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed or inconsistent definition (algorithm, run, resource, package).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A run, variable, resource, or algorithm file is missing.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// A value does not match the variable's declared type.
    #[error("type mismatch for '{variable}': expected {expected}, found {found}")]
    TypeMismatch {
        variable: String,
        expected: String,
        found: String,
    },

    /// A value has the right type but violates enum, nullability, or metaschema.
    #[error("constraint violated for '{variable}': {message}")]
    Constraint { variable: String, message: String },

    /// A rule or target kind with no defined semantics.
    #[error("unsupported {what} '{kind}'")]
    UnsupportedRule { what: &'static str, kind: String },

    #[error("run already exists: {0}")]
    AlreadyExists(String),

    /// The algorithm prefix of a run name is not declared by the package.
    #[error("unknown algorithm '{0}' (not declared in datapackage.json)")]
    UnknownAlgorithm(String),

    #[error("invalid run name '{name}': {reason}")]
    InvalidRunName { name: String, reason: String },

    /// The run is not in a state that allows the requested action.
    #[error("run '{run}' is {status}; cannot {action}")]
    InvalidState {
        run: String,
        status: String,
        action: &'static str,
    },

    /// The execution backend (or renderer) failed. Carries the captured logs.
    #[error("execution of '{run}' failed (exit code {}):\n{logs}", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Execution {
        run: String,
        exit_code: Option<i32>,
        logs: String,
    },

    #[error("{action} {}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Settings(String),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRunName {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
