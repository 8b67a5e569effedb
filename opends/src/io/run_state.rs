//! Lifecycle bookkeeping for a run (`runs/<run>/state.json`).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::lifecycle::RunStatus;
use crate::error::{Error, Result};
use crate::io::json::{read_json, write_json};

/// Persisted lifecycle state of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RunState {
    pub status: RunStatus,
    /// Number of successful executions.
    pub executions: u32,
    /// Epoch seconds of the last successful execution.
    pub last_executed: Option<i64>,
    /// Name of the last successfully rendered view.
    pub last_view: Option<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            status: RunStatus::Initialized,
            executions: 0,
            last_executed: None,
            last_view: None,
        }
    }
}

/// Load run state from disk.
pub fn load_run_state(path: &Path) -> Result<RunState> {
    let state: RunState = read_json(path, "run state")?;
    debug!(status = %state.status, executions = state.executions, "run state loaded");
    Ok(state)
}

/// Load run state, treating a missing file as a freshly initialized run.
pub fn load_or_default_run_state(path: &Path) -> Result<RunState> {
    match load_run_state(path) {
        Err(Error::NotFound { .. }) => Ok(RunState::default()),
        other => other,
    }
}

/// Atomically write run state to disk (temp file + rename).
pub fn write_run_state(path: &Path, state: &RunState) -> Result<()> {
    debug!(path = %path.display(), status = %state.status, "writing run state");
    write_json(path, state)
}
