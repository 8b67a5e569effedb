//! Loading and committing runs as one unit.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::core::algorithm::Algorithm;
use crate::core::resource::Resource;
use crate::core::run::{Run, RunContents, RunName};
use crate::error::{Error, Result};
use crate::io::algorithm_store::load_algorithm;
use crate::io::json::{StagedWrite, read_json};
use crate::io::package::load_package;
use crate::io::paths::PackagePaths;
use crate::io::run_state::{RunState, load_or_default_run_state};

/// Explicit handle to one run: every mutating operation takes one.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub paths: PackagePaths,
    pub name: RunName,
    pub algorithm: Algorithm,
    pub contents: RunContents,
    pub state: RunState,
}

/// Load and validate a run.
///
/// The run must be a member of a declared algorithm and exist on disk.
pub fn open_run(paths: &PackagePaths, name: &str) -> Result<RunContext> {
    let name = RunName::parse(name)?;
    let package = load_package(paths)?;
    if !package.declares(name.algorithm()) {
        return Err(Error::UnknownAlgorithm(name.algorithm().to_string()));
    }
    if !paths.run_path(&name).is_file() {
        return Err(Error::not_found("run", name.to_string()));
    }

    let algorithm = load_algorithm(paths, name.algorithm())?;
    let contents = load_contents(paths, &name)?;
    contents.validate(&algorithm)?;
    if contents.run.name != name.as_str() {
        return Err(Error::Validation(format!(
            "run directory '{name}' holds run '{}'",
            contents.run.name
        )));
    }
    let state = load_or_default_run_state(&paths.run_state_path(&name))?;
    debug!(run = %name, status = %state.status, "run opened");
    Ok(RunContext {
        paths: paths.clone(),
        name,
        algorithm,
        contents,
        state,
    })
}

/// Read `run.json` and every resource its variables reference.
pub fn load_contents(paths: &PackagePaths, name: &RunName) -> Result<RunContents> {
    let run: Run = read_json(&paths.run_path(name), "run")?;
    let mut resources = BTreeMap::new();
    for var in run.variables() {
        if let Some(reference) = &var.resource {
            let resource: Resource =
                read_json(&paths.run_resource_path(name, reference.as_str()), "resource")?;
            if resource.name != reference.as_str() {
                return Err(Error::Validation(format!(
                    "resource file for '{reference}' is named '{}'",
                    resource.name
                )));
            }
            resources.insert(reference.as_str().to_string(), resource);
        }
    }
    Ok(RunContents { run, resources })
}

/// Write run.json, every resource, and state.json under `dir` as one staged write.
pub fn write_run_files(dir: &Path, contents: &RunContents, state: &RunState) -> Result<()> {
    let mut staged = StagedWrite::default();
    staged.add_json(&dir.join("run.json"), &contents.run)?;
    for (name, resource) in &contents.resources {
        staged.add_json(&dir.join("resources").join(format!("{name}.json")), resource)?;
    }
    staged.add_json(&dir.join("state.json"), state)?;
    debug!(dir = %dir.display(), files = staged.len(), "committing run");
    staged.commit()
}

/// Persist the context's run contents and lifecycle state.
pub fn commit_run(ctx: &RunContext) -> Result<()> {
    write_run_files(&ctx.paths.run_dir(&ctx.name), &ctx.contents, &ctx.state)
}

/// Run directory names found on disk, sorted. Staging directories are skipped.
pub fn list_run_dirs(paths: &PackagePaths) -> Result<Vec<String>> {
    let entries = match fs::read_dir(&paths.runs_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(Error::io("read directory", &paths.runs_dir, err)),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| Error::io("read directory", &paths.runs_dir, err))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;
    use crate::create::create_run;
    use crate::test_support::TestPackage;

    #[test]
    fn open_returns_what_create_wrote() {
        let pkg = TestPackage::new().expect("package");
        let created = create_run(pkg.paths(), "smooth.base").expect("create");
        let opened = open_run(pkg.paths(), "smooth.base").expect("open");
        assert_eq!(opened.contents, created.contents);
        assert_eq!(opened.state, created.state);
    }

    #[test]
    fn commit_persists_every_file() {
        let pkg = TestPackage::new().expect("package");
        let mut ctx = create_run(pkg.paths(), "smooth.base").expect("create");
        ctx.contents.run.variable_mut("threshold").expect("var").value = Some(Value::from(9));
        ctx.contents
            .resource_mut("params")
            .expect("params")
            .data
            .clear();
        commit_run(&ctx).expect("commit");

        let reopened = open_run(pkg.paths(), "smooth.base").expect("open");
        assert_eq!(reopened.contents, ctx.contents);
    }

    #[test]
    fn unknown_run_is_not_found() {
        let pkg = TestPackage::new().expect("package");
        let err = open_run(pkg.paths(), "smooth.missing").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "run", .. }));
    }

    #[test]
    fn undeclared_algorithm_is_unknown() {
        let pkg = TestPackage::new().expect("package");
        let err = open_run(pkg.paths(), "other.base").unwrap_err();
        assert!(matches!(err, Error::UnknownAlgorithm(_)));
    }

    #[test]
    fn listing_skips_staging_dirs() {
        let pkg = TestPackage::new().expect("package");
        create_run(pkg.paths(), "smooth.base").expect("create");
        fs::create_dir_all(pkg.paths().runs_dir.join(".smooth.x.staging")).expect("mkdir");
        assert_eq!(list_run_dirs(pkg.paths()).expect("list"), vec!["smooth.base"]);
    }
}
