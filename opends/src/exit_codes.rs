//! Stable exit codes for `opends` CLI commands.

use crate::error::Error;

/// Command succeeded.
pub const OK: i32 = 0;
/// Unclassified failure (I/O, settings, or anything not listed below).
pub const FAILURE: i32 = 1;
/// Malformed or inconsistent definitions, or `validate` found problems.
pub const INVALID: i32 = 2;
/// Run, variable, resource, algorithm, or active run is missing.
pub const NOT_FOUND: i32 = 3;
/// Value rejected by type, enum, nullability, or metaschema.
pub const REJECTED_VALUE: i32 = 4;
/// Relationship rule or target kind is not supported.
pub const UNSUPPORTED: i32 = 5;
/// Run name is malformed, already taken, or names an undeclared algorithm.
pub const BAD_RUN_NAME: i32 = 6;
/// Operation not allowed in the run's current lifecycle state.
pub const INVALID_STATE: i32 = 7;
/// The execution backend or view renderer failed.
pub const EXECUTION_FAILED: i32 = 8;

/// Exit code for a domain error.
pub fn exit_code_for(err: &Error) -> i32 {
    match err {
        Error::Validation(_) => INVALID,
        Error::NotFound { .. } => NOT_FOUND,
        Error::TypeMismatch { .. } | Error::Constraint { .. } => REJECTED_VALUE,
        Error::UnsupportedRule { .. } => UNSUPPORTED,
        Error::AlreadyExists(_) | Error::UnknownAlgorithm(_) | Error::InvalidRunName { .. } => {
            BAD_RUN_NAME
        }
        Error::InvalidState { .. } => INVALID_STATE,
        Error::Execution { .. } => EXECUTION_FAILED,
        Error::Io { .. } | Error::Settings(_) => FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_per_kind() {
        let errors = [
            Error::Validation("x".to_string()),
            Error::not_found("run", "a.b"),
            Error::Constraint {
                variable: "v".to_string(),
                message: "m".to_string(),
            },
            Error::UnsupportedRule {
                what: "rule type",
                kind: "range".to_string(),
            },
            Error::UnknownAlgorithm("x".to_string()),
            Error::InvalidState {
                run: "a.b".to_string(),
                status: "initialized".to_string(),
                action: "render a view",
            },
            Error::Execution {
                run: "a.b".to_string(),
                exit_code: Some(1),
                logs: String::new(),
            },
        ];
        let codes: Vec<i32> = errors.iter().map(exit_code_for).collect();
        assert_eq!(codes, vec![2, 3, 4, 5, 6, 7, 8]);
    }
}
