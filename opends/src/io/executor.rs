//! Execution backend abstraction.
//!
//! The [`Executor`] and [`ViewRenderer`] traits decouple the run lifecycle
//! from the container runtime. Tests use scripted backends that edit the run
//! directory directly instead of spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::io::config::BackendConfig;
use crate::io::process::run_command;

/// What the backend needs to know to execute one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Full run name (`<algorithm>.<label>`).
    pub run: String,
    pub algorithm: String,
    /// Container image, possibly overridden for this invocation.
    pub container: String,
    pub label: String,
    /// Enabled input variable names in declaration order.
    pub inputs: Vec<String>,
    /// Package root, mounted read/write into the container.
    pub root: PathBuf,
}

/// A view rendering request against an executed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub exec: ExecRequest,
    pub view: String,
    /// Host directory the renderer writes into.
    pub output_dir: PathBuf,
}

/// Captured backend log output of a successful invocation (may be empty).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub logs: String,
}

/// Runs an algorithm against a committed run.
///
/// Results are communicated by mutating the run's files in place. A failure
/// must be an [`Error::Execution`] carrying the captured logs.
pub trait Executor {
    fn execute(&self, request: &ExecRequest) -> Result<ExecOutput>;
}

/// Produces a named view from an executed run.
pub trait ViewRenderer {
    fn render(&self, request: &RenderRequest) -> Result<ExecOutput>;
}

/// Backend that invokes a container runtime (`docker run` by default).
#[derive(Debug, Clone)]
pub struct DockerBackend {
    config: BackendConfig,
}

impl DockerBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Option<Duration> {
        self.config.timeout_secs.map(Duration::from_secs)
    }

    /// Build the runtime invocation for `request`, with `extra_env` appended.
    pub fn command(&self, request: &ExecRequest, extra_env: &[(&str, String)]) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.arg("run")
            .arg("--rm")
            .arg("-v")
            .arg(format!("{}:{}", request.root.display(), self.config.mount_point));
        let env = [
            ("ALGORITHM", request.algorithm.clone()),
            ("CONTAINER", request.container.clone()),
            ("RUN", request.label.clone()),
            ("INPUTS", request.inputs.join(",")),
        ];
        for (key, value) in env.iter().chain(extra_env.iter()) {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.args(&self.config.extra_args).arg(&request.container);
        cmd
    }

    fn invoke(&self, run: &str, cmd: Command) -> Result<ExecOutput> {
        let output = match run_command(cmd, self.timeout(), self.config.output_limit_bytes) {
            Ok(output) => output,
            Err(Error::Io { action, path, source }) => {
                warn!(run, action, err = %source, "backend could not be run");
                return Err(Error::Execution {
                    run: run.to_string(),
                    exit_code: None,
                    logs: format!("failed to {action} {}: {source}", path.display()),
                });
            }
            Err(err) => return Err(err),
        };
        let logs = output.combined_log();
        if !output.success() {
            warn!(run, exit_code = ?output.status.code(), timed_out = output.timed_out, "backend failed");
            return Err(Error::Execution {
                run: run.to_string(),
                exit_code: output.status.code(),
                logs,
            });
        }
        debug!(run, log_bytes = logs.len(), "backend finished");
        Ok(ExecOutput { logs })
    }
}

impl Executor for DockerBackend {
    #[instrument(skip_all, fields(run = %request.run, container = %request.container))]
    fn execute(&self, request: &ExecRequest) -> Result<ExecOutput> {
        info!(program = %self.config.program, "starting execution backend");
        self.invoke(&request.run, self.command(request, &[]))
    }
}

impl ViewRenderer for DockerBackend {
    #[instrument(skip_all, fields(run = %request.exec.run, view = %request.view))]
    fn render(&self, request: &RenderRequest) -> Result<ExecOutput> {
        info!(program = %self.config.program, "starting view renderer");
        let view_output = format!(
            "{}/runs/{}/views/{}",
            self.config.mount_point.trim_end_matches('/'),
            request.exec.run,
            request.view
        );
        let cmd = self.command(
            &request.exec,
            &[("VIEW", request.view.clone()), ("VIEW_OUTPUT", view_output)],
        );
        self.invoke(&request.exec.run, cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExecRequest {
        ExecRequest {
            run: "smooth.base".to_string(),
            algorithm: "smooth".to_string(),
            container: "example/smooth:1".to_string(),
            label: "base".to_string(),
            inputs: vec!["mode".to_string(), "params".to_string()],
            root: PathBuf::from("/data/pkg"),
        }
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn command_follows_backend_contract() {
        let backend = DockerBackend::new(BackendConfig::default());
        let cmd = backend.command(&request(), &[]);
        assert_eq!(cmd.get_program(), "docker");
        assert_eq!(
            args(&cmd),
            vec![
                "run",
                "--rm",
                "-v",
                "/data/pkg:/usr/src/app/datapackage",
                "-e",
                "ALGORITHM=smooth",
                "-e",
                "CONTAINER=example/smooth:1",
                "-e",
                "RUN=base",
                "-e",
                "INPUTS=mode,params",
                "example/smooth:1",
            ]
        );
    }

    #[test]
    fn extra_args_precede_image() {
        let config = BackendConfig {
            program: "podman".to_string(),
            extra_args: vec!["--network".to_string(), "none".to_string()],
            ..BackendConfig::default()
        };
        let cmd = DockerBackend::new(config).command(&request(), &[("VIEW", "plot".to_string())]);
        let args = args(&cmd);
        assert_eq!(cmd.get_program(), "podman");
        assert_eq!(
            &args[args.len() - 5..],
            ["-e", "VIEW=plot", "--network", "none", "example/smooth:1"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn failing_backend_reports_logs() {
        let config = BackendConfig {
            program: "sh".to_string(),
            ..BackendConfig::default()
        };
        // `sh run ...` fails because there is no script named "run".
        let err = DockerBackend::new(config).execute(&request()).unwrap_err();
        assert!(matches!(err, Error::Execution { exit_code: Some(_), .. }));
    }

    #[test]
    fn missing_program_is_an_execution_failure() {
        let config = BackendConfig {
            program: "opends-missing-runtime".to_string(),
            ..BackendConfig::default()
        };
        let err = DockerBackend::new(config).execute(&request()).unwrap_err();
        match err {
            Error::Execution { run, exit_code, logs } => {
                assert_eq!(run, "smooth.base");
                assert_eq!(exit_code, None);
                assert!(logs.contains("opends-missing-runtime"), "{logs}");
            }
            other => panic!("expected execution failure, got {other:?}"),
        }
    }
}
