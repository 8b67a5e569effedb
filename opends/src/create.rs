//! Orchestration for creating a new run (`absent → initialized`).
//!
//! The run is assembled in `runs/.<run>.staging/` and renamed into place, so
//! a failed initialization never leaves a partial `runs/<run>/` behind.

use std::fs;

use tracing::{debug, info, warn};

use crate::core::run::{RunContents, RunName};
use crate::error::{Error, Result};
use crate::io::algorithm_store::{load_algorithm, load_resource_templates};
use crate::io::package::{load_package, write_package};
use crate::io::paths::PackagePaths;
use crate::io::run_state::RunState;
use crate::io::run_store::{RunContext, write_run_files};

/// Materialize a run from its algorithm's signature defaults and record it in the package.
pub fn create_run(paths: &PackagePaths, name: &str) -> Result<RunContext> {
    let name = RunName::parse(name)?;
    let mut package = load_package(paths)?;
    if !package.declares(name.algorithm()) {
        return Err(Error::UnknownAlgorithm(name.algorithm().to_string()));
    }
    let run_dir = paths.run_dir(&name);
    if run_dir.exists() {
        return Err(Error::AlreadyExists(name.to_string()));
    }

    let algorithm = load_algorithm(paths, name.algorithm())?;
    let templates = load_resource_templates(paths, &algorithm)?;
    let contents = RunContents::initialize(&algorithm, &name, &templates)?;
    let state = RunState::default();

    let staging = paths.run_staging_dir(&name);
    if staging.exists() {
        warn!(path = %staging.display(), "removing stale staging directory");
        fs::remove_dir_all(&staging).map_err(|err| Error::io("remove directory", &staging, err))?;
    }
    let built = write_run_files(&staging, &contents, &state).and_then(|()| {
        fs::rename(&staging, &run_dir).map_err(|err| Error::io("create run directory", &run_dir, err))
    });
    if let Err(err) = built {
        discard(&staging);
        return Err(err);
    }
    debug!(run = %name, dir = %run_dir.display(), "run directory created");

    package.record_run(name.as_str());
    if let Err(err) = write_package(paths, &mut package) {
        discard(&run_dir);
        return Err(err);
    }

    info!(run = %name, algorithm = %algorithm.name, "run initialized");
    Ok(RunContext {
        paths: paths.clone(),
        name,
        algorithm,
        contents,
        state,
    })
}

fn discard(dir: &std::path::Path) {
    if dir.exists()
        && let Err(err) = fs::remove_dir_all(dir)
    {
        warn!(path = %dir.display(), err = %err, "failed to remove directory");
    }
}
