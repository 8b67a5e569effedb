//! `opends`: configure, execute, and inspect runs of a data package.
//!
//! Commands act on the package found by walking up from the working
//! directory (or `--root`). Run-scoped commands use `--run` when given and
//! the active run otherwise.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use opends::core::propagate::PropagationReport;
use opends::core::run::RunName;
use opends::core::variable::Variable;
use opends::error::Error;
use opends::execute::{ExecuteOptions, execute_run, render_view};
use opends::exit_codes::{self, exit_code_for};
use opends::io::config::load_settings;
use opends::io::executor::DockerBackend;
use opends::io::package::load_package;
use opends::io::paths::PackagePaths;
use opends::io::run_state::load_or_default_run_state;
use opends::io::run_store::RunContext;
use opends::mutate::{load_resource_file, set_variable, set_variable_from_str};
use opends::select::{active_run, resolve_run, select_run};
use opends::validate::validate_package;
use opends::{create, logging, reset};

#[derive(Parser)]
#[command(
    name = "opends",
    version,
    about = "Configure and execute algorithm runs in a data package"
)]
struct Cli {
    /// Package root (defaults to the nearest ancestor with datapackage.json).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List recorded runs with their status (`*` marks the active run).
    Runs,
    /// Create a run `<algorithm>.<label>` from the algorithm's defaults.
    Init {
        run: String,
        /// Also make it the active run.
        #[arg(long)]
        select: bool,
    },
    /// Make an existing run the active run.
    Select { run: String },
    /// Print a run's variables and resources.
    Show {
        #[arg(long)]
        run: Option<String>,
    },
    /// Set a scalar input and apply its relationships.
    Set {
        variable: String,
        /// New value, parsed strictly for the variable's type.
        #[arg(required_unless_present = "unset")]
        value: Option<String>,
        /// Clear the value instead (nullable variables only).
        #[arg(long, conflicts_with = "value")]
        unset: bool,
        #[arg(long)]
        run: Option<String>,
    },
    /// Replace a resource input from a JSON file (rows, or `{schema?, data}`).
    Load {
        variable: String,
        file: PathBuf,
        #[arg(long)]
        run: Option<String>,
    },
    /// Execute a run in the configured container backend.
    Execute {
        #[arg(long)]
        run: Option<String>,
        /// Use this image for this invocation only.
        #[arg(long)]
        container: Option<String>,
    },
    /// Render a view of an executed run.
    View {
        view: String,
        #[arg(long)]
        run: Option<String>,
    },
    /// Delete one run.
    Remove { run: String },
    /// Delete every run and clear the active run.
    Reset {
        /// Confirm the irreversible reset.
        #[arg(long)]
        yes: bool,
    },
    /// Check the package, its algorithms, and its runs.
    Validate,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            err.downcast_ref::<Error>()
                .map_or(exit_codes::FAILURE, exit_code_for)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let paths = match &cli.root {
        Some(root) => PackagePaths::discover(root)?,
        None => {
            let cwd = std::env::current_dir().context("read current directory")?;
            PackagePaths::discover(&cwd)?
        }
    };

    match cli.command {
        Command::Runs => cmd_runs(&paths)?,
        Command::Init { run, select } => {
            let ctx = create::create_run(&paths, &run)?;
            if select {
                select_run(&paths, &run)?;
            }
            println!("initialized {}", ctx.name);
        }
        Command::Select { run } => {
            let ctx = select_run(&paths, &run)?;
            println!("selected {}", ctx.name);
        }
        Command::Show { run } => {
            let ctx = resolve_run(&paths, run.as_deref())?;
            print_run(&ctx)?;
        }
        Command::Set {
            variable,
            value,
            unset,
            run,
        } => {
            let mut ctx = resolve_run(&paths, run.as_deref())?;
            let report = match (unset, value) {
                (true, _) => set_variable(&mut ctx, &variable, None)?,
                (false, Some(raw)) => set_variable_from_str(&mut ctx, &variable, &raw)?,
                (false, None) => bail!("missing value for '{variable}' (or pass --unset)"),
            };
            let var = ctx.contents.run.variable(&variable)?;
            println!("{} = {}", variable, display_value(var));
            print_report(&report);
        }
        Command::Load {
            variable,
            file,
            run,
        } => {
            let mut ctx = resolve_run(&paths, run.as_deref())?;
            let report = load_resource_file(&mut ctx, &variable, &file)?;
            let rows = ctx.contents.resource(&variable)?.data.len();
            println!("loaded {variable} ({rows} rows)");
            print_report(&report);
        }
        Command::Execute { run, container } => {
            let mut ctx = resolve_run(&paths, run.as_deref())?;
            let settings = load_settings(&paths.settings_path)?;
            let backend = DockerBackend::new(settings.backend);
            let output = execute_run(&mut ctx, &backend, &ExecuteOptions { container })?;
            print!("{}", output.logs);
            println!("executed {}", ctx.name);
        }
        Command::View { view, run } => {
            let mut ctx = resolve_run(&paths, run.as_deref())?;
            let settings = load_settings(&paths.settings_path)?;
            let backend = DockerBackend::new(settings.backend);
            let output = render_view(&mut ctx, &backend, &view)?;
            print!("{}", output.logs);
            println!(
                "rendered {view} into {}",
                paths.view_dir(&ctx.name, &view).display()
            );
        }
        Command::Remove { run } => {
            reset::remove_run(&paths, &run)?;
            println!("removed {run}");
        }
        Command::Reset { yes } => {
            if !yes {
                bail!("reset deletes every run; pass --yes to confirm");
            }
            let removed = reset::reset(&paths)?;
            println!("removed {} run(s)", removed.len());
        }
        Command::Validate => {
            let report = validate_package(&paths)?;
            for problem in &report.problems {
                println!("problem: {problem}");
            }
            println!(
                "{} algorithm(s), {} valid run(s), {} problem(s)",
                report.algorithms.len(),
                report.runs.len(),
                report.problems.len()
            );
            if !report.is_ok() {
                return Ok(exit_codes::INVALID);
            }
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_runs(paths: &PackagePaths) -> Result<()> {
    let package = load_package(paths)?;
    let active = active_run(paths)?;
    for name in &package.runs {
        let marker = if active.as_deref() == Some(name.as_str()) {
            "*"
        } else {
            " "
        };
        let status = match RunName::parse(name) {
            Ok(run) => load_or_default_run_state(&paths.run_state_path(&run))
                .map(|state| state.status.to_string())
                .unwrap_or_else(|_| "unreadable".to_string()),
            Err(_) => "invalid name".to_string(),
        };
        println!("{marker} {name} ({status})");
    }
    Ok(())
}

fn print_run(ctx: &RunContext) -> Result<()> {
    let run = &ctx.contents.run;
    println!("{} [{}]", run.name, ctx.state.status);
    println!("  title:     {}", run.title);
    println!("  algorithm: {}", run.algorithm);
    println!("  container: {}", run.container);
    for (side, vars) in [("inputs", &run.data.inputs), ("outputs", &run.data.outputs)] {
        println!("  {side}:");
        for var in vars {
            let disabled = if var.disabled { " (disabled)" } else { "" };
            let shown = if var.kind.is_scalar() {
                display_value(var)
            } else {
                let rows = ctx.contents.resource(&var.name)?.data.len();
                format!("<{rows} rows>")
            };
            println!("    {:<16} {:<8} {shown}{disabled}", var.name, var.kind);
        }
    }
    Ok(())
}

fn display_value(var: &Variable) -> String {
    var.value
        .as_ref()
        .map_or_else(|| "null".to_string(), ToString::to_string)
}

fn print_report(report: &PropagationReport) {
    for target in &report.applied {
        println!("  -> {target}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_with_select() {
        let cli = Cli::parse_from(["opends", "init", "smooth.base", "--select"]);
        assert!(matches!(cli.command, Command::Init { select: true, .. }));
    }

    #[test]
    fn parse_set_requires_value_or_unset() {
        assert!(Cli::try_parse_from(["opends", "set", "mode"]).is_err());
        let cli = Cli::parse_from(["opends", "set", "score", "--unset"]);
        assert!(matches!(
            cli.command,
            Command::Set {
                unset: true,
                value: None,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["opends", "set", "mode", "on", "--unset"]).is_err());
    }

    #[test]
    fn parse_global_root_after_subcommand() {
        let cli = Cli::parse_from(["opends", "execute", "--root", "/pkg", "--container", "img:1"]);
        assert_eq!(cli.root, Some(PathBuf::from("/pkg")));
        assert!(matches!(
            cli.command,
            Command::Execute {
                container: Some(_),
                run: None
            }
        ));
    }
}
