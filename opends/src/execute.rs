//! Hand-off to the execution backend and the view renderer.
//!
//! The backend writes results straight into the run directory through the
//! shared mount. A snapshot taken beforehand is restored when the backend
//! fails or leaves a run that no longer validates, so a failed execution
//! never changes the committed run.

use tracing::{error, info, warn};

use crate::core::lifecycle::Transition;
use crate::core::resource::validate_resource_name;
use crate::error::{Error, Result};
use crate::io::executor::{ExecOutput, ExecRequest, Executor, RenderRequest, ViewRenderer};
use crate::io::json::write_atomic;
use crate::io::run_state::write_run_state;
use crate::io::run_store::{RunContext, load_contents};
use crate::io::snapshot::RunSnapshot;

/// Per-invocation execution options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Run with this image instead of the run's configured container. Not persisted.
    pub container: Option<String>,
}

/// The request handed to the backend for `ctx`.
pub fn exec_request(ctx: &RunContext, options: &ExecuteOptions) -> ExecRequest {
    let run = &ctx.contents.run;
    ExecRequest {
        run: ctx.name.to_string(),
        algorithm: run.algorithm.clone(),
        container: options
            .container
            .clone()
            .unwrap_or_else(|| run.container.clone()),
        label: ctx.name.label().to_string(),
        inputs: ctx
            .contents
            .enabled_inputs()
            .into_iter()
            .map(str::to_string)
            .collect(),
        root: ctx.paths.root.clone(),
    }
}

/// Execute the run and record the outcome.
///
/// On success the run is reloaded from disk (the backend updated its
/// outputs), validated, and moved to `executed`.
pub fn execute_run<E: Executor>(
    ctx: &mut RunContext,
    executor: &E,
    options: &ExecuteOptions,
) -> Result<ExecOutput> {
    ctx.contents.check_ready()?;
    let next = ctx.state.status.next(ctx.name.as_str(), Transition::Execute)?;
    let request = exec_request(ctx, options);
    let run_dir = ctx.paths.run_dir(&ctx.name);
    let snapshot = RunSnapshot::capture(&run_dir, &ctx.paths.run_snapshot_dir(&ctx.name))?;

    info!(run = %ctx.name, container = %request.container, inputs = ?request.inputs, "executing run");
    let result = executor.execute(&request);
    let log_path = ctx.paths.run_log_dir(&ctx.name).join("execution.log");
    save_log(&log_path, &result);

    let output = match result {
        Ok(output) => output,
        Err(err) => {
            warn!(run = %ctx.name, "execution failed; restoring run");
            restore(snapshot);
            return Err(err);
        }
    };

    let reloaded = load_contents(&ctx.paths, &ctx.name).and_then(|contents| {
        contents.validate(&ctx.algorithm)?;
        Ok(contents)
    });
    let contents = match reloaded {
        Ok(contents) => contents,
        Err(err) => {
            warn!(run = %ctx.name, err = %err, "backend left an invalid run; restoring");
            restore(snapshot);
            return Err(Error::Execution {
                run: ctx.name.to_string(),
                exit_code: Some(0),
                logs: format!("{}\n[backend left an invalid run: {err}]", output.logs),
            });
        }
    };

    let mut state = ctx.state.clone();
    state.status = next;
    state.executions += 1;
    state.last_executed = Some(chrono::Utc::now().timestamp());
    if let Err(err) = write_run_state(&ctx.paths.run_state_path(&ctx.name), &state) {
        restore(snapshot);
        return Err(err);
    }
    if let Err(err) = snapshot.discard() {
        warn!(run = %ctx.name, err = %err, "failed to remove run snapshot");
    }

    info!(run = %ctx.name, executions = state.executions, "run executed");
    ctx.contents = contents;
    ctx.state = state;
    Ok(output)
}

/// Render `view` from an executed run into `runs/<run>/views/<view>/`.
///
/// Failure leaves the run in its executed state.
pub fn render_view<R: ViewRenderer>(
    ctx: &mut RunContext,
    renderer: &R,
    view: &str,
) -> Result<ExecOutput> {
    validate_resource_name(view)
        .map_err(|_| Error::Validation(format!("view name must be [A-Za-z0-9_-]+ (got '{view}')")))?;
    let next = ctx
        .state
        .status
        .next(ctx.name.as_str(), Transition::RenderView)?;

    let output_dir = ctx.paths.view_dir(&ctx.name, view);
    std::fs::create_dir_all(&output_dir)
        .map_err(|err| Error::io("create directory", &output_dir, err))?;
    let request = RenderRequest {
        exec: exec_request(ctx, &ExecuteOptions::default()),
        view: view.to_string(),
        output_dir,
    };

    info!(run = %ctx.name, view, "rendering view");
    let result = renderer.render(&request);
    let log_path = ctx.paths.run_log_dir(&ctx.name).join(format!("view-{view}.log"));
    save_log(&log_path, &result);
    let output = result?;

    let mut state = ctx.state.clone();
    state.status = next;
    state.last_view = Some(view.to_string());
    write_run_state(&ctx.paths.run_state_path(&ctx.name), &state)?;
    info!(run = %ctx.name, view, "view rendered");
    ctx.state = state;
    Ok(output)
}

fn save_log(path: &std::path::Path, result: &Result<ExecOutput>) {
    let logs = match result {
        Ok(output) => output.logs.as_str(),
        Err(Error::Execution { logs, .. }) => logs.as_str(),
        Err(_) => return,
    };
    if let Err(err) = write_atomic(path, logs) {
        warn!(path = %path.display(), err = %err, "failed to save backend log");
    }
}

fn restore(snapshot: RunSnapshot) {
    if let Err(err) = snapshot.restore() {
        error!(err = %err, "failed to restore run snapshot");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lifecycle::RunStatus;
    use crate::core::value::Value;
    use crate::create::create_run;
    use crate::io::config::BackendConfig;
    use crate::io::executor::DockerBackend;
    use crate::io::run_store::open_run;
    use crate::mutate::set_variable_from_str;
    use crate::test_support::{ScriptedExec, ScriptedExecutor, TestPackage};
    use serde_json::json;

    fn setup() -> (TestPackage, RunContext) {
        let pkg = TestPackage::new().expect("package");
        let ctx = create_run(pkg.paths(), "smooth.base").expect("create");
        (pkg, ctx)
    }

    #[test]
    fn success_reloads_outputs_and_counts() {
        let (pkg, mut ctx) = setup();
        let executor = ScriptedExecutor::new(vec![
            ScriptedExec::success("done\n").with_output("score", json!(0.75)),
        ]);
        let output = execute_run(&mut ctx, &executor, &ExecuteOptions::default()).expect("execute");

        assert_eq!(output.logs, "done\n");
        assert_eq!(ctx.state.status, RunStatus::Executed);
        assert_eq!(ctx.state.executions, 1);
        assert!(ctx.state.last_executed.is_some());
        assert_eq!(
            ctx.contents.run.variable("score").expect("score").value,
            Some(serde_json::from_value::<Value>(json!(0.75)).expect("value"))
        );
        let log = pkg.paths().run_log_dir(&ctx.name).join("execution.log");
        assert_eq!(std::fs::read_to_string(log).expect("log"), "done\n");
        assert!(!pkg.paths().run_snapshot_dir(&ctx.name).exists());
    }

    #[test]
    fn request_carries_contract_fields() {
        let (pkg, mut ctx) = setup();
        set_variable_from_str(&mut ctx, "mode", "off").expect("set");
        let executor = ScriptedExecutor::new(vec![ScriptedExec::success("")]);
        let options = ExecuteOptions {
            container: Some("opends/smooth:dev".to_string()),
        };
        execute_run(&mut ctx, &executor, &options).expect("execute");

        let requests = executor.requests.borrow();
        assert_eq!(
            requests[0],
            ExecRequest {
                run: "smooth.base".to_string(),
                algorithm: "smooth".to_string(),
                container: "opends/smooth:dev".to_string(),
                label: "base".to_string(),
                inputs: vec!["mode".to_string(), "params".to_string(), "table".to_string()],
                root: pkg.root().to_path_buf(),
            }
        );
        let reopened = open_run(pkg.paths(), "smooth.base").expect("open");
        assert_eq!(reopened.contents.run.container, "opends/smooth:latest");
    }

    #[test]
    fn failure_restores_run_and_surfaces_logs() {
        let (pkg, mut ctx) = setup();
        set_variable_from_str(&mut ctx, "threshold", "3").expect("set");
        let before = pkg.snapshot_runs();
        let executor = ScriptedExecutor::new(vec![
            ScriptedExec::failure(2, "boom")
                .with_output("score", json!(1))
                .with_file("resources/result.json", "garbage"),
        ]);

        let err = execute_run(&mut ctx, &executor, &ExecuteOptions::default()).unwrap_err();
        match err {
            Error::Execution { exit_code, logs, .. } => {
                assert_eq!(exit_code, Some(2));
                assert_eq!(logs, "boom");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(pkg.snapshot_runs(), before);
        assert_eq!(ctx.state.status, RunStatus::Configured);
        let log = pkg.paths().run_log_dir(&ctx.name).join("execution.log");
        assert_eq!(std::fs::read_to_string(log).expect("log"), "boom");
    }

    #[test]
    fn unavailable_runtime_is_reported_as_execution_failure() {
        let (pkg, mut ctx) = setup();
        let before = pkg.snapshot_runs();
        let backend = DockerBackend::new(BackendConfig {
            program: "opends-missing-runtime".to_string(),
            ..BackendConfig::default()
        });

        let err = execute_run(&mut ctx, &backend, &ExecuteOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Execution { exit_code: None, .. }));
        assert_eq!(pkg.snapshot_runs(), before);
        assert_eq!(ctx.state.status, RunStatus::Initialized);
        let log = pkg.paths().run_log_dir(&ctx.name).join("execution.log");
        let saved = std::fs::read_to_string(log).expect("log");
        assert!(saved.contains("opends-missing-runtime"), "{saved}");
    }

    #[test]
    fn invalid_backend_output_is_rolled_back() {
        let (pkg, mut ctx) = setup();
        let before = pkg.snapshot_runs();
        let executor = ScriptedExecutor::new(vec![
            ScriptedExec::success("ok").with_output("score", json!("not a number")),
        ]);
        let err = execute_run(&mut ctx, &executor, &ExecuteOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
        assert_eq!(pkg.snapshot_runs(), before);
    }

    #[test]
    fn missing_required_input_blocks_execution() {
        let (_pkg, mut ctx) = setup();
        ctx.contents.run.variable_mut("threshold").expect("threshold").value = None;
        let executor = ScriptedExecutor::new(Vec::new());
        let err = execute_run(&mut ctx, &executor, &ExecuteOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(executor.requests.borrow().is_empty());
    }

    #[test]
    fn views_need_an_executed_run() {
        let (pkg, mut ctx) = setup();
        let executor = ScriptedExecutor::new(vec![
            ScriptedExec::success(""),
            ScriptedExec::success("rendered").with_file("views/plot/index.html", "<html/>"),
            ScriptedExec::failure(1, "render failed"),
        ]);
        let err = render_view(&mut ctx, &executor, "plot").unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));

        execute_run(&mut ctx, &executor, &ExecuteOptions::default()).expect("execute");
        render_view(&mut ctx, &executor, "plot").expect("render");
        assert_eq!(ctx.state.status, RunStatus::ViewRendered);
        assert_eq!(ctx.state.last_view.as_deref(), Some("plot"));
        assert!(pkg.paths().view_dir(&ctx.name, "plot").join("index.html").is_file());

        let err = render_view(&mut ctx, &executor, "plot").unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
        assert_eq!(ctx.state.status, RunStatus::ViewRendered);
        let reopened = open_run(pkg.paths(), "smooth.base").expect("open");
        assert_eq!(reopened.state.status, RunStatus::ViewRendered);
    }

    #[test]
    fn view_names_are_checked() {
        let (_pkg, mut ctx) = setup();
        let executor = ScriptedExecutor::new(Vec::new());
        assert!(matches!(
            render_view(&mut ctx, &executor, "../escape"),
            Err(Error::Validation(_))
        ));
    }
}
