//! Whole-package consistency check for `opends validate`.

use tracing::debug;

use crate::error::Result;
use crate::io::algorithm_store::{load_algorithm, load_resource_templates};
use crate::io::config::load_settings;
use crate::io::package::load_package;
use crate::io::paths::PackagePaths;
use crate::io::run_store::{list_run_dirs, open_run};
use crate::select::active_run;

/// Outcome of [`validate_package`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageReport {
    /// Declared algorithms, all of which loaded cleanly.
    pub algorithms: Vec<String>,
    /// Runs that opened and validated.
    pub runs: Vec<String>,
    /// Inconsistencies between the package, the run directories, and the active pointer.
    pub problems: Vec<String>,
}

impl PackageReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Load the package, settings, every declared algorithm, and every run.
///
/// Broken algorithm definitions and settings fail immediately. Run-level
/// inconsistencies are collected into [`PackageReport::problems`].
pub fn validate_package(paths: &PackagePaths) -> Result<PackageReport> {
    let package = load_package(paths)?;
    load_settings(&paths.settings_path)?;

    let mut report = PackageReport::default();
    for name in &package.algorithms {
        let algorithm = load_algorithm(paths, name)?;
        load_resource_templates(paths, &algorithm)?;
        report.algorithms.push(name.clone());
    }

    let on_disk = list_run_dirs(paths)?;
    for name in &on_disk {
        if !package.has_run(name) {
            report
                .problems
                .push(format!("run directory '{name}' is not recorded in the package"));
        }
    }
    for name in &package.runs {
        if !on_disk.contains(name) {
            report
                .problems
                .push(format!("recorded run '{name}' has no directory"));
            continue;
        }
        match open_run(paths, name) {
            Ok(_) => report.runs.push(name.clone()),
            Err(err) => report.problems.push(format!("run '{name}': {err}")),
        }
    }

    if let Some(active) = active_run(paths)?
        && !report.runs.contains(&active)
    {
        report
            .problems
            .push(format!("active run '{active}' is not a valid run"));
    }

    debug!(
        algorithms = report.algorithms.len(),
        runs = report.runs.len(),
        problems = report.problems.len(),
        "package validated"
    );
    Ok(report)
}
