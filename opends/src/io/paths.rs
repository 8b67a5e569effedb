//! Canonical paths within a data package.

use std::path::{Path, PathBuf};

use crate::core::run::RunName;
use crate::error::{Error, Result};

pub const PACKAGE_FILE: &str = "datapackage.json";

/// All canonical paths for a package root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePaths {
    pub root: PathBuf,
    pub package_path: PathBuf,
    pub algorithms_dir: PathBuf,
    pub runs_dir: PathBuf,
    /// Tool-local state (`.opends/`), not part of the published package.
    pub tool_dir: PathBuf,
    pub local_config_path: PathBuf,
    pub settings_path: PathBuf,
    pub logs_dir: PathBuf,
}

impl PackagePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let tool_dir = root.join(".opends");
        Self {
            package_path: root.join(PACKAGE_FILE),
            algorithms_dir: root.join("algorithms"),
            runs_dir: root.join("runs"),
            local_config_path: tool_dir.join("config.json"),
            settings_path: tool_dir.join("settings.toml"),
            logs_dir: tool_dir.join("logs"),
            tool_dir,
            root,
        }
    }

    /// Walk up from `start` to the nearest directory holding `datapackage.json`.
    pub fn discover(start: &Path) -> Result<Self> {
        start
            .ancestors()
            .find(|dir| dir.join(PACKAGE_FILE).is_file())
            .map(Self::new)
            .ok_or_else(|| {
                Error::not_found(
                    "data package",
                    format!("{PACKAGE_FILE} in {} or any parent", start.display()),
                )
            })
    }

    pub fn algorithm_dir(&self, algorithm: &str) -> PathBuf {
        self.algorithms_dir.join(algorithm)
    }

    pub fn algorithm_path(&self, algorithm: &str) -> PathBuf {
        self.algorithm_dir(algorithm).join("algorithm.json")
    }

    pub fn relationships_path(&self, algorithm: &str) -> PathBuf {
        self.algorithm_dir(algorithm).join("relationships.json")
    }

    pub fn template_path(&self, algorithm: &str, resource: &str) -> PathBuf {
        self.algorithm_dir(algorithm)
            .join("resources")
            .join(format!("{resource}.json"))
    }

    pub fn run_dir(&self, run: &RunName) -> PathBuf {
        self.runs_dir.join(run.as_str())
    }

    /// Scratch directory a new run is assembled in before it is renamed into place.
    pub fn run_staging_dir(&self, run: &RunName) -> PathBuf {
        self.runs_dir.join(format!(".{}.staging", run.as_str()))
    }

    /// Copy of a run directory taken before handing it to the backend.
    pub fn run_snapshot_dir(&self, run: &RunName) -> PathBuf {
        self.runs_dir.join(format!(".{}.snapshot", run.as_str()))
    }

    pub fn run_path(&self, run: &RunName) -> PathBuf {
        self.run_dir(run).join("run.json")
    }

    pub fn run_state_path(&self, run: &RunName) -> PathBuf {
        self.run_dir(run).join("state.json")
    }

    pub fn run_resource_path(&self, run: &RunName, resource: &str) -> PathBuf {
        self.run_dir(run)
            .join("resources")
            .join(format!("{resource}.json"))
    }

    pub fn view_dir(&self, run: &RunName, view: &str) -> PathBuf {
        self.run_dir(run).join("views").join(view)
    }

    pub fn run_log_dir(&self, run: &RunName) -> PathBuf {
        self.logs_dir.join(run.as_str())
    }
}
