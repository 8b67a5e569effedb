//! Active-run selection for `opends select` and commands run without `--run`.

use tracing::info;

use crate::core::run::RunName;
use crate::error::{Error, Result};
use crate::io::config::{LocalConfig, load_local_config, write_local_config};
use crate::io::package::load_package;
use crate::io::paths::PackagePaths;
use crate::io::run_store::{RunContext, open_run};

/// Validate `name` and record it as the active run.
///
/// A malformed name, an undeclared algorithm prefix, or a run that does not
/// exist are all reported as `InvalidRunName`.
pub fn select_run(paths: &PackagePaths, name: &str) -> Result<RunContext> {
    let run = RunName::parse(name)?;
    let package = load_package(paths)?;
    if !package.declares(run.algorithm()) {
        return Err(Error::invalid_name(
            name,
            format!("algorithm '{}' is not declared by the package", run.algorithm()),
        ));
    }
    if !paths.run_path(&run).is_file() {
        return Err(Error::invalid_name(name, "run does not exist"));
    }
    let ctx = open_run(paths, name)?;
    write_local_config(
        &paths.local_config_path,
        &LocalConfig {
            run: Some(run.to_string()),
        },
    )?;
    info!(run = %run, "active run selected");
    Ok(ctx)
}

/// Name of the active run, if one is selected.
pub fn active_run(paths: &PackagePaths) -> Result<Option<String>> {
    Ok(load_local_config(&paths.local_config_path)?.run)
}

/// Open the active run.
pub fn open_active_run(paths: &PackagePaths) -> Result<RunContext> {
    let name = active_run(paths)?
        .ok_or_else(|| Error::not_found("active run", "no run selected (use `opends select`)"))?;
    open_run(paths, &name)
}

/// Open `explicit` when given, otherwise the active run.
pub fn resolve_run(paths: &PackagePaths, explicit: Option<&str>) -> Result<RunContext> {
    match explicit {
        Some(name) => open_run(paths, name),
        None => open_active_run(paths),
    }
}

/// Clear the active pointer when it refers to `name` (or to any run when `name` is `None`).
pub(crate) fn clear_active(paths: &PackagePaths, name: Option<&str>) -> Result<()> {
    let config = load_local_config(&paths.local_config_path)?;
    let Some(current) = config.run.as_deref() else {
        return Ok(());
    };
    if name.is_none_or(|name| name == current) {
        write_local_config(&paths.local_config_path, &LocalConfig { run: None })?;
        info!(run = current, "active run cleared");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create::create_run;
    use crate::test_support::TestPackage;

    #[test]
    fn select_records_active_run() {
        let pkg = TestPackage::new().expect("package");
        create_run(pkg.paths(), "smooth.base").expect("create");
        select_run(pkg.paths(), "smooth.base").expect("select");
        assert_eq!(
            active_run(pkg.paths()).expect("active").as_deref(),
            Some("smooth.base")
        );
        let ctx = open_active_run(pkg.paths()).expect("open");
        assert_eq!(ctx.name.as_str(), "smooth.base");
    }

    #[test]
    fn select_rejects_bad_names_and_missing_runs() {
        let pkg = TestPackage::new().expect("package");
        create_run(pkg.paths(), "smooth.base").expect("create");
        for bad in ["smooth", "other.base", "smooth.missing"] {
            let err = select_run(pkg.paths(), bad).unwrap_err();
            assert!(matches!(err, Error::InvalidRunName { .. }), "{bad}");
        }
        assert_eq!(active_run(pkg.paths()).expect("active"), None);
    }

    #[test]
    fn no_active_run_is_not_found() {
        let pkg = TestPackage::new().expect("package");
        let err = open_active_run(pkg.paths()).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "active run", .. }));
    }

    #[test]
    fn clear_active_only_matches_named_run() {
        let pkg = TestPackage::new().expect("package");
        create_run(pkg.paths(), "smooth.base").expect("create");
        select_run(pkg.paths(), "smooth.base").expect("select");

        clear_active(pkg.paths(), Some("smooth.other")).expect("clear");
        assert!(active_run(pkg.paths()).expect("active").is_some());
        clear_active(pkg.paths(), Some("smooth.base")).expect("clear");
        assert_eq!(active_run(pkg.paths()).expect("active"), None);
    }
}
