//! Package-level configuration stored in `datapackage.json`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::io::json::{read_json, write_json};
use crate::io::paths::PackagePaths;

/// Declared algorithms and recorded runs of a data package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Package {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub profile: String,
    pub algorithms: Vec<String>,
    #[serde(default)]
    pub runs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Epoch seconds.
    pub created: i64,
    /// Epoch seconds, bumped on every write.
    pub updated: i64,
}

pub const PACKAGE_PROFILE: &str = "opends-package";

impl Package {
    pub fn new(title: impl Into<String>, algorithms: Vec<String>) -> Self {
        let now = Utc::now().timestamp();
        Self {
            title: title.into(),
            description: String::new(),
            profile: PACKAGE_PROFILE.to_string(),
            algorithms,
            runs: Vec::new(),
            repository: None,
            created: now,
            updated: now,
        }
    }

    pub fn declares(&self, algorithm: &str) -> bool {
        self.algorithms.iter().any(|name| name == algorithm)
    }

    pub fn has_run(&self, run: &str) -> bool {
        self.runs.iter().any(|name| name == run)
    }

    pub fn record_run(&mut self, run: &str) {
        if !self.has_run(run) {
            self.runs.push(run.to_string());
        }
    }

    pub fn forget_run(&mut self, run: &str) {
        self.runs.retain(|name| name != run);
    }
}

pub fn load_package(paths: &PackagePaths) -> Result<Package> {
    let package: Package = read_json(&paths.package_path, "data package")?;
    debug!(
        algorithms = package.algorithms.len(),
        runs = package.runs.len(),
        "package loaded"
    );
    Ok(package)
}

/// Atomically write the package, bumping `updated`.
pub fn write_package(paths: &PackagePaths, package: &mut Package) -> Result<()> {
    package.updated = Utc::now().timestamp().max(package.created);
    write_json(&paths.package_path, package)
}
