//! Run lifecycle state machine.
//!
//! `absent -> initialized -> configured <-> executed -> view-rendered`, with
//! `reset` returning every run to absent. "Absent" has no persisted status:
//! it is the lack of a run directory.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Initialized,
    Configured,
    Executed,
    ViewRendered,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Initialized => "initialized",
            RunStatus::Configured => "configured",
            RunStatus::Executed => "executed",
            RunStatus::ViewRendered => "view-rendered",
        })
    }
}

/// Actions that move a run between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `set` / `load`.
    Configure,
    /// Successful backend execution.
    Execute,
    /// Successful view rendering.
    RenderView,
}

impl Transition {
    fn action(self) -> &'static str {
        match self {
            Transition::Configure => "configure",
            Transition::Execute => "execute",
            Transition::RenderView => "render a view",
        }
    }
}

impl RunStatus {
    /// Status after `transition`, or `InvalidState` when it is not allowed.
    ///
    /// Mutations are legal in every state and always land in `configured`;
    /// execution is legal in every state (a freshly initialized run executes
    /// with its defaults); views need a completed execution.
    pub fn next(self, run: &str, transition: Transition) -> Result<RunStatus> {
        match (self, transition) {
            (_, Transition::Configure) => Ok(RunStatus::Configured),
            (_, Transition::Execute) => Ok(RunStatus::Executed),
            (RunStatus::Executed | RunStatus::ViewRendered, Transition::RenderView) => {
                Ok(RunStatus::ViewRendered)
            }
            (status, transition) => Err(Error::InvalidState {
                run: run.to_string(),
                status: status.to_string(),
                action: transition.action(),
            }),
        }
    }
}
