//! Removing runs: one at a time (`remove`) or all of them (`reset`). Irreversible.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::core::run::RunName;
use crate::error::{Error, Result};
use crate::io::package::{load_package, write_package};
use crate::io::paths::PackagePaths;
use crate::io::run_store::list_run_dirs;
use crate::select::clear_active;

/// Delete one run, drop it from the package, and clear the active pointer if it pointed at it.
pub fn remove_run(paths: &PackagePaths, name: &str) -> Result<()> {
    let run = RunName::parse(name)?;
    let mut package = load_package(paths)?;
    let run_dir = paths.run_dir(&run);
    if !run_dir.exists() && !package.has_run(run.as_str()) {
        return Err(Error::not_found("run", run.to_string()));
    }

    remove_dir(&run_dir)?;
    remove_dir(&paths.run_snapshot_dir(&run))?;
    remove_dir(&paths.run_log_dir(&run))?;
    package.forget_run(run.as_str());
    write_package(paths, &mut package)?;
    clear_active(paths, Some(run.as_str()))?;
    info!(run = %run, "run removed");
    Ok(())
}

/// Return every run to absent: delete `runs/`, the logs, the package's run list, and the active pointer.
///
/// Returns the names of the run directories that were removed.
pub fn reset(paths: &PackagePaths) -> Result<Vec<String>> {
    let mut package = load_package(paths)?;
    let removed = list_run_dirs(paths)?;
    for name in package.runs.iter().filter(|name| !removed.contains(name)) {
        warn!(run = %name, "recorded run had no directory");
    }

    remove_dir(&paths.runs_dir)?;
    remove_dir(&paths.logs_dir)?;
    package.runs.clear();
    write_package(paths, &mut package)?;
    clear_active(paths, None)?;
    info!(runs = removed.len(), "package reset");
    Ok(removed)
}

fn remove_dir(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path).map_err(|err| Error::io("remove directory", path, err))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create::create_run;
    use crate::select::{active_run, select_run};
    use crate::test_support::TestPackage;

    #[test]
    fn remove_drops_directory_record_and_selection() {
        let pkg = TestPackage::new().expect("package");
        create_run(pkg.paths(), "smooth.a").expect("create");
        create_run(pkg.paths(), "smooth.b").expect("create");
        select_run(pkg.paths(), "smooth.a").expect("select");

        remove_run(pkg.paths(), "smooth.a").expect("remove");
        assert!(!pkg.paths().runs_dir.join("smooth.a").exists());
        assert_eq!(load_package(pkg.paths()).expect("package").runs, vec!["smooth.b"]);
        assert_eq!(active_run(pkg.paths()).expect("active"), None);

        let err = remove_run(pkg.paths(), "smooth.a").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "run", .. }));
    }

    #[test]
    fn reset_clears_everything() {
        let pkg = TestPackage::new().expect("package");
        create_run(pkg.paths(), "smooth.a").expect("create");
        create_run(pkg.paths(), "smooth.b").expect("create");
        select_run(pkg.paths(), "smooth.b").expect("select");

        let removed = reset(pkg.paths()).expect("reset");
        assert_eq!(removed, vec!["smooth.a", "smooth.b"]);
        assert!(!pkg.paths().runs_dir.exists());
        assert!(load_package(pkg.paths()).expect("package").runs.is_empty());
        assert_eq!(active_run(pkg.paths()).expect("active"), None);

        create_run(pkg.paths(), "smooth.a").expect("name is free again");
    }

    #[test]
    fn reset_of_empty_package_is_a_noop() {
        let pkg = TestPackage::new().expect("package");
        assert!(reset(pkg.paths()).expect("reset").is_empty());
    }
}
