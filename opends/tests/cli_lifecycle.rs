//! CLI tests for the `opends` binary.
//!
//! Spawns the binary inside a temp package and checks exit codes and the
//! files each command leaves behind.

use std::process::{Command, Output};

use opends::exit_codes;
use opends::io::package::load_package;
use opends::io::run_store::open_run;
use opends::select::active_run;
use opends::test_support::TestPackage;

fn opends(pkg: &TestPackage, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_opends"))
        .current_dir(pkg.root())
        .args(args)
        .output()
        .expect("run opends")
}

#[test]
fn init_select_set_show() {
    let pkg = TestPackage::new().expect("package");

    let out = opends(&pkg, &["init", "smooth.base", "--select"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    assert_eq!(
        active_run(pkg.paths()).expect("active").as_deref(),
        Some("smooth.base")
    );

    let out = opends(&pkg, &["set", "mode", "off"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    assert!(String::from_utf8_lossy(&out.stdout).contains("-> threshold"));

    let ctx = open_run(pkg.paths(), "smooth.base").expect("open");
    assert!(ctx.contents.run.variable("threshold").expect("threshold").disabled);

    let out = opends(&pkg, &["show"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("smooth.base [configured]"));
    assert!(stdout.contains("(disabled)"));
}

#[test]
fn rejected_values_use_stable_codes() {
    let pkg = TestPackage::new().expect("package");
    opends(&pkg, &["init", "smooth.base"]);

    let out = opends(&pkg, &["set", "threshold", "high", "--run", "smooth.base"]);
    assert_eq!(out.status.code(), Some(exit_codes::REJECTED_VALUE));
    assert!(String::from_utf8_lossy(&out.stderr).contains("type mismatch"));

    let out = opends(&pkg, &["set", "threshold", "1"]);
    assert_eq!(out.status.code(), Some(exit_codes::NOT_FOUND));

    let out = opends(&pkg, &["init", "unknown.base"]);
    assert_eq!(out.status.code(), Some(exit_codes::BAD_RUN_NAME));
    assert!(!pkg.paths().runs_dir.join("unknown.base").exists());

    let out = opends(&pkg, &["view", "plot", "--run", "smooth.base"]);
    assert_eq!(out.status.code(), Some(exit_codes::INVALID_STATE));
}

#[test]
fn remove_reset_and_validate() {
    let pkg = TestPackage::new().expect("package");
    opends(&pkg, &["init", "smooth.a"]);
    opends(&pkg, &["init", "smooth.b"]);

    let out = opends(&pkg, &["validate"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");

    let out = opends(&pkg, &["remove", "smooth.a"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    assert_eq!(load_package(pkg.paths()).expect("package").runs, vec!["smooth.b"]);

    let out = opends(&pkg, &["reset"]);
    assert_eq!(out.status.code(), Some(exit_codes::FAILURE));
    assert!(pkg.paths().runs_dir.join("smooth.b").exists());

    let out = opends(&pkg, &["reset", "--yes"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    assert!(!pkg.paths().runs_dir.exists());
}

#[test]
fn outside_a_package_is_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = Command::new(env!("CARGO_BIN_EXE_opends"))
        .current_dir(temp.path())
        .arg("runs")
        .status()
        .expect("run opends");
    assert_eq!(status.code(), Some(exit_codes::NOT_FOUND));
}
