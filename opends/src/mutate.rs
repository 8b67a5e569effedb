//! Variable and resource mutations (`set`, `load`), each committed with its propagation.

use std::path::Path;

use tracing::{debug, info};

use crate::core::lifecycle::Transition;
use crate::core::propagate::{PropagationReport, propagate};
use crate::core::resource::ResourceUpload;
use crate::core::run::RunContents;
use crate::core::value::Value;
use crate::core::variable::{Variable, VariableType};
use crate::error::{Error, Result};
use crate::io::json::read_json;
use crate::io::run_store::{RunContext, write_run_files};

/// Assign a scalar input (or clear it with `None`), propagate, and commit.
///
/// Nothing is written unless the value checks and the whole propagation succeed.
pub fn set_variable(
    ctx: &mut RunContext,
    name: &str,
    value: Option<Value>,
) -> Result<PropagationReport> {
    let var = input(ctx, name)?;
    if !var.kind.is_scalar() {
        return Err(Error::TypeMismatch {
            variable: name.to_string(),
            expected: "a scalar variable (use load for resources)".to_string(),
            found: var.kind.to_string(),
        });
    }
    var.check(value.as_ref())?;

    let mut working = ctx.contents.clone();
    working.run.variable_mut(name)?.value = value;
    commit_mutation(ctx, working, name)
}

/// Parse `raw` strictly for the variable's declared type, then [`set_variable`].
pub fn set_variable_from_str(
    ctx: &mut RunContext,
    name: &str,
    raw: &str,
) -> Result<PropagationReport> {
    let value = input(ctx, name)?.parse(raw)?;
    set_variable(ctx, name, Some(value))
}

/// Replace the data (and schema, when supplied) of a resource input.
pub fn load_resource(
    ctx: &mut RunContext,
    name: &str,
    upload: ResourceUpload,
) -> Result<PropagationReport> {
    let var = input(ctx, name)?;
    if var.kind != VariableType::Resource {
        return Err(Error::TypeMismatch {
            variable: name.to_string(),
            expected: "a resource variable (use set for scalars)".to_string(),
            found: var.kind.to_string(),
        });
    }

    let mut working = ctx.contents.clone();
    let resource = working.resource_mut(name)?;
    upload.apply_to(resource);
    resource.validate()?;
    commit_mutation(ctx, working, name)
}

/// [`load_resource`] from a JSON file holding rows or `{schema?, data}`.
pub fn load_resource_file(
    ctx: &mut RunContext,
    name: &str,
    path: &Path,
) -> Result<PropagationReport> {
    let upload: ResourceUpload = read_json(path, "resource upload")?;
    load_resource(ctx, name, upload)
}

fn input<'a>(ctx: &'a RunContext, name: &str) -> Result<&'a Variable> {
    let var = ctx.contents.run.variable(name)?;
    if !ctx.contents.run.data.inputs.iter().any(|input| input.name == name) {
        return Err(Error::Validation(format!(
            "'{name}' is an output of '{}'; outputs are written by the execution backend",
            ctx.name
        )));
    }
    Ok(var)
}

fn commit_mutation(
    ctx: &mut RunContext,
    working: RunContents,
    source: &str,
) -> Result<PropagationReport> {
    let (next, report) = propagate(&ctx.algorithm.relationships, &working, source)?;
    next.validate(&ctx.algorithm)?;
    let mut state = ctx.state.clone();
    state.status = state.status.next(ctx.name.as_str(), Transition::Configure)?;

    write_run_files(&ctx.paths.run_dir(&ctx.name), &next, &state)?;
    debug!(
        run = %ctx.name,
        source,
        matched_rules = report.matched_rules.len(),
        applied = ?report.applied,
        "propagation committed"
    );
    info!(run = %ctx.name, variable = source, status = %state.status, "run configured");
    ctx.contents = next;
    ctx.state = state;
    Ok(report)
}
