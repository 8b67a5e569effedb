//! Fixtures shared by unit tests and the integration tests under `tests/`.
//!
//! Enabled with the `test-support` feature.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;

use serde_json::json;
use tempfile::TempDir;

use crate::core::algorithm::Algorithm;
use crate::core::resource::Resource;
use crate::core::run::{RunContents, RunName};
use crate::error::{Error, Result};
use crate::io::executor::{ExecOutput, ExecRequest, Executor, RenderRequest, ViewRenderer};
use crate::io::json::{read_json, write_json};
use crate::io::package::{Package, write_package};
use crate::io::paths::PackagePaths;

/// The `smooth` algorithm: two scalar inputs, two resource inputs, one of each output.
///
/// `mode = "off"` disables `threshold`; `mode = "on"` re-enables it.
pub fn sample_algorithm() -> Algorithm {
    serde_json::from_value(json!({
        "name": "smooth",
        "title": "Smoothing",
        "profile": "opends-algorithm",
        "code": "main.py",
        "container": "opends/smooth:latest",
        "signature": {
            "inputs": [
                {"name": "mode", "type": "string", "enum": ["on", "off"], "default": "on"},
                {"name": "threshold", "type": "number", "default": 5,
                 "metaschema": {"type": "number", "minimum": 0}},
                {"name": "params", "type": "resource", "resource": "params"},
                {"name": "table", "type": "resource", "resource": "table"}
            ],
            "outputs": [
                {"name": "score", "type": "number", "null": true},
                {"name": "result", "type": "resource", "resource": "result"}
            ]
        },
        "relationships": [{
            "source": "mode",
            "rules": [
                {"type": "value", "values": ["off"],
                 "targets": [{"name": "threshold", "type": "value", "disabled": true}]},
                {"type": "value", "values": ["on"],
                 "targets": [{"name": "threshold", "type": "value", "disabled": false}]}
            ]
        }]
    }))
    .expect("sample algorithm")
}

/// Templates for every resource referenced by [`sample_algorithm`].
pub fn sample_templates() -> BTreeMap<String, Resource> {
    let resources: Vec<Resource> = serde_json::from_value(json!([
        {
            "name": "params",
            "profile": "parameter-tabular-data-resource",
            "schema": {"fields": [
                {"name": "name", "type": "string"},
                {"name": "init", "type": "number"}
            ]},
            "data": [{"name": "alpha", "init": 1}]
        },
        {
            "name": "table",
            "profile": "tabular-data-resource",
            "schema": {"fields": [
                {"name": "x", "type": "integer"},
                {"name": "y", "type": "number"}
            ]},
            "data": []
        },
        {
            "name": "result",
            "profile": "tabular-data-resource",
            "schema": {"fields": [{"name": "value", "type": "number"}]},
            "data": []
        }
    ]))
    .expect("sample templates");
    resources
        .into_iter()
        .map(|resource| (resource.name.clone(), resource))
        .collect()
}

/// A freshly initialized run of [`sample_algorithm`].
pub fn sample_contents(name: &str) -> RunContents {
    let name = RunName::parse(name).expect("run name");
    RunContents::initialize(&sample_algorithm(), &name, &sample_templates())
        .expect("initialize sample run")
}

/// A data package in a temp directory declaring the `smooth` algorithm.
pub struct TestPackage {
    _temp: TempDir,
    paths: PackagePaths,
}

impl TestPackage {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().map_err(|err| Error::io("create", "tempdir", err))?;
        let paths = PackagePaths::new(temp.path());
        let mut package = Package::new("Test package", vec!["smooth".to_string()]);
        write_package(&paths, &mut package)?;
        write_json(&paths.algorithm_path("smooth"), &sample_algorithm())?;
        for (name, template) in sample_templates() {
            write_json(&paths.template_path("smooth", &name), &template)?;
        }
        Ok(Self { _temp: temp, paths })
    }

    pub fn paths(&self) -> &PackagePaths {
        &self.paths
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    /// Add an algorithm directory (with no templates) and declare it when `declare` is set.
    pub fn add_algorithm(&self, algorithm: &Algorithm, declare: bool) -> Result<()> {
        write_json(&self.paths.algorithm_path(&algorithm.name), algorithm)?;
        if declare {
            let mut package = crate::io::package::load_package(&self.paths)?;
            package.algorithms.push(algorithm.name.clone());
            write_package(&self.paths, &mut package)?;
        }
        Ok(())
    }

    /// Every file under `runs/` with its contents, for before/after comparisons.
    pub fn snapshot_runs(&self) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        collect_files(&self.paths.runs_dir, &self.paths.runs_dir, &mut files);
        files
    }
}

fn collect_files(base: &Path, dir: &Path, files: &mut BTreeMap<String, String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(base, &path, files);
        } else {
            let rel = path
                .strip_prefix(base)
                .map(|rel| rel.display().to_string())
                .unwrap_or_default();
            files.insert(rel, fs::read_to_string(&path).unwrap_or_default());
        }
    }
}

/// A change a scripted backend makes to the run directory.
#[derive(Debug, Clone)]
pub enum ScriptedEdit {
    /// Set an output variable's value in `run.json`.
    SetOutput { name: String, value: serde_json::Value },
    /// Write a file relative to the run directory.
    WriteFile { path: String, contents: String },
}

/// One scripted backend invocation.
#[derive(Debug, Clone)]
pub struct ScriptedExec {
    pub edits: Vec<ScriptedEdit>,
    pub logs: String,
    /// `None` succeeds; `Some(code)` fails with that exit code after applying edits.
    pub exit_code: Option<i32>,
}

impl ScriptedExec {
    pub fn success(logs: &str) -> Self {
        Self {
            edits: Vec::new(),
            logs: logs.to_string(),
            exit_code: None,
        }
    }

    pub fn failure(exit_code: i32, logs: &str) -> Self {
        Self {
            exit_code: Some(exit_code),
            ..Self::success(logs)
        }
    }

    pub fn with_output(mut self, name: &str, value: serde_json::Value) -> Self {
        self.edits.push(ScriptedEdit::SetOutput {
            name: name.to_string(),
            value,
        });
        self
    }

    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.edits.push(ScriptedEdit::WriteFile {
            path: path.to_string(),
            contents: contents.to_string(),
        });
        self
    }
}

/// Backend that replays queued invocations and records the requests it saw.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    queue: RefCell<VecDeque<ScriptedExec>>,
    pub requests: RefCell<Vec<ExecRequest>>,
    pub renders: RefCell<Vec<RenderRequest>>,
}

impl ScriptedExecutor {
    pub fn new(steps: Vec<ScriptedExec>) -> Self {
        Self {
            queue: RefCell::new(steps.into()),
            ..Self::default()
        }
    }

    fn replay(&self, request: &ExecRequest) -> Result<ExecOutput> {
        let step = self.queue.borrow_mut().pop_front().ok_or_else(|| Error::Execution {
            run: request.run.clone(),
            exit_code: None,
            logs: "scripted executor queue is empty".to_string(),
        })?;
        let run_dir = request.root.join("runs").join(&request.run);
        for edit in &step.edits {
            apply_edit(&run_dir, edit)?;
        }
        match step.exit_code {
            None => Ok(ExecOutput { logs: step.logs }),
            Some(code) => Err(Error::Execution {
                run: request.run.clone(),
                exit_code: Some(code),
                logs: step.logs,
            }),
        }
    }
}

fn apply_edit(run_dir: &Path, edit: &ScriptedEdit) -> Result<()> {
    match edit {
        ScriptedEdit::SetOutput { name, value } => {
            let path = run_dir.join("run.json");
            let mut run: serde_json::Value = read_json(&path, "run")?;
            let outputs = run["data"]["outputs"]
                .as_array_mut()
                .ok_or_else(|| Error::Validation("run.json has no outputs".to_string()))?;
            let output = outputs
                .iter_mut()
                .find(|var| var["name"] == name.as_str())
                .ok_or_else(|| Error::not_found("variable", name.clone()))?;
            output["value"] = value.clone();
            write_json(&path, &run)
        }
        ScriptedEdit::WriteFile { path, contents } => {
            let path = run_dir.join(path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|err| Error::io("create directory", parent, err))?;
            }
            fs::write(&path, contents).map_err(|err| Error::io("write", &path, err))
        }
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&self, request: &ExecRequest) -> Result<ExecOutput> {
        self.requests.borrow_mut().push(request.clone());
        self.replay(request)
    }
}

impl ViewRenderer for ScriptedExecutor {
    fn render(&self, request: &RenderRequest) -> Result<ExecOutput> {
        self.renders.borrow_mut().push(request.clone());
        self.replay(&request.exec)
    }
}
