//! Runs: named instantiations of an algorithm with their own variable values.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::algorithm::Algorithm;
use crate::core::resource::Resource;
use crate::core::variable::{Variable, VariableType};
use crate::error::{Error, Result};

pub const RUN_PROFILE: &str = "opends-run";

static RUN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+\.[a-zA-Z0-9_]+$").expect("valid regex"));
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("valid regex"));

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// A validated `<algorithm>.<label>` run name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunName {
    full: String,
    dot: usize,
}

impl RunName {
    pub fn parse(name: &str) -> Result<Self> {
        if !RUN_NAME.is_match(name) {
            return Err(Error::invalid_name(
                name,
                "expected <algorithm>.<label> using [a-zA-Z0-9_]",
            ));
        }
        let dot = name.find('.').ok_or_else(|| Error::invalid_name(name, "missing '.'"))?;
        Ok(Self {
            full: name.to_string(),
            dot,
        })
    }

    pub fn algorithm(&self) -> &str {
        &self.full[..self.dot]
    }

    pub fn label(&self) -> &str {
        &self.full[self.dot + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }
}

impl fmt::Display for RunName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunData {
    pub inputs: Vec<Variable>,
    pub outputs: Vec<Variable>,
}

/// Persisted run configuration (`run.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Run {
    pub name: String,
    pub title: String,
    pub profile: String,
    pub algorithm: String,
    pub container: String,
    pub data: RunData,
}

impl Run {
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.data.inputs.iter().chain(self.data.outputs.iter())
    }

    pub fn variable(&self, name: &str) -> Result<&Variable> {
        self.variables()
            .find(|var| var.name == name)
            .ok_or_else(|| Error::not_found("variable", format!("{} in run {}", name, self.name)))
    }

    pub fn variable_mut(&mut self, name: &str) -> Result<&mut Variable> {
        let run = self.name.clone();
        self.data
            .inputs
            .iter_mut()
            .chain(self.data.outputs.iter_mut())
            .find(|var| var.name == name)
            .ok_or_else(|| Error::not_found("variable", format!("{name} in run {run}")))
    }
}

/// A run together with the resources its variables are bound to.
///
/// This is the unit that propagation mutates and that is persisted atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContents {
    pub run: Run,
    /// Keyed by resource name.
    pub resources: BTreeMap<String, Resource>,
}

impl RunContents {
    /// Materialize a new run from the algorithm's signature defaults.
    ///
    /// `templates` holds the algorithm's resource templates keyed by name.
    pub fn initialize(
        algorithm: &Algorithm,
        name: &RunName,
        templates: &BTreeMap<String, Resource>,
    ) -> Result<Self> {
        let instantiate = |var: &Variable| {
            let mut var = var.clone();
            if var.kind.is_scalar() {
                var.value = var.default.clone();
            }
            var
        };
        let run = Run {
            name: name.to_string(),
            title: format!("{} ({})", algorithm.title, name.label()),
            profile: RUN_PROFILE.to_string(),
            algorithm: algorithm.name.clone(),
            container: algorithm.container.clone(),
            data: RunData {
                inputs: algorithm.signature.inputs.iter().map(instantiate).collect(),
                outputs: algorithm.signature.outputs.iter().map(instantiate).collect(),
            },
        };

        let mut resources = BTreeMap::new();
        for var in run.variables() {
            if let Some(reference) = &var.resource {
                let template = templates.get(reference.as_str()).ok_or_else(|| {
                    Error::not_found("resource template", format!("{reference} for {}", var.name))
                })?;
                resources.insert(reference.as_str().to_string(), template.clone());
            }
        }

        let contents = Self { run, resources };
        contents.validate(algorithm)?;
        Ok(contents)
    }

    pub fn resource(&self, variable: &str) -> Result<&Resource> {
        let var = self.run.variable(variable)?;
        let reference = resource_ref(var)?;
        self.resources
            .get(reference)
            .ok_or_else(|| Error::not_found("resource", reference.to_string()))
    }

    pub fn resource_mut(&mut self, variable: &str) -> Result<&mut Resource> {
        let var = self.run.variable(variable)?;
        let reference = resource_ref(var)?.to_string();
        self.resources
            .get_mut(&reference)
            .ok_or_else(|| Error::not_found("resource", reference))
    }

    /// Check the run against its algorithm and the resource invariants.
    pub fn validate(&self, algorithm: &Algorithm) -> Result<()> {
        let run = &self.run;
        let name = RunName::parse(&run.name)?;
        if name.algorithm() != algorithm.name || run.algorithm != algorithm.name {
            return Err(Error::Validation(format!(
                "run '{}' does not belong to algorithm '{}'",
                run.name, algorithm.name
            )));
        }
        if run.profile != RUN_PROFILE {
            return Err(Error::Validation(format!(
                "run '{}' has profile '{}' (expected '{RUN_PROFILE}')",
                run.name, run.profile
            )));
        }

        let mut seen = HashSet::new();
        let sides = [
            (&run.data.inputs, &algorithm.signature.inputs, "input"),
            (&run.data.outputs, &algorithm.signature.outputs, "output"),
        ];
        for (vars, declared, side) in sides {
            for var in vars {
                if !seen.insert(var.name.as_str()) {
                    return Err(Error::Validation(format!(
                        "duplicate variable '{}' in run '{}'",
                        var.name, run.name
                    )));
                }
                let decl = declared.iter().find(|d| d.name == var.name).ok_or_else(|| {
                    Error::Validation(format!(
                        "run '{}' has {side} '{}' not declared by '{}'",
                        run.name, var.name, algorithm.name
                    ))
                })?;
                if decl.kind != var.kind {
                    return Err(Error::Validation(format!(
                        "variable '{}' is {} in run but {} in algorithm",
                        var.name, var.kind, decl.kind
                    )));
                }
                if var.kind.is_scalar() {
                    if var.value.is_some() {
                        var.check(var.value.as_ref())?;
                    }
                } else {
                    let resource = self.resource(&var.name)?;
                    resource.validate()?;
                }
            }
        }
        Ok(())
    }

    /// Every enabled, non-nullable scalar input must have a value before execution.
    pub fn check_ready(&self) -> Result<()> {
        let missing = self
            .run
            .data
            .inputs
            .iter()
            .filter(|var| !var.disabled && var.kind.is_scalar() && !var.nullable && var.value.is_none())
            .map(|var| var.name.as_str())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "run '{}' is missing values for: {}",
                self.run.name,
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Names of inputs handed to the execution backend (disabled ones excluded).
    pub fn enabled_inputs(&self) -> Vec<&str> {
        self.run
            .data
            .inputs
            .iter()
            .filter(|var| !var.disabled)
            .map(|var| var.name.as_str())
            .collect()
    }
}

fn resource_ref(var: &Variable) -> Result<&str> {
    if var.kind != VariableType::Resource {
        return Err(Error::TypeMismatch {
            variable: var.name.clone(),
            expected: VariableType::Resource.to_string(),
            found: var.kind.to_string(),
        });
    }
    var.resource
        .as_ref()
        .map(|reference| reference.as_str())
        .ok_or_else(|| Error::not_found("resource", format!("binding of {}", var.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;
    use crate::test_support::{sample_algorithm, sample_contents};

    #[test]
    fn run_name_splits_algorithm_and_label() {
        let name = RunName::parse("smooth.baseline_2").expect("valid");
        assert_eq!(name.algorithm(), "smooth");
        assert_eq!(name.label(), "baseline_2");
    }

    #[test]
    fn run_name_pattern_is_exact() {
        for bad in ["smooth", "smooth.", ".base", "a.b.c", "smo-oth.base", "smooth.ba se", ""] {
            let err = RunName::parse(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidRunName { .. }), "{bad}");
        }
    }

    #[test]
    fn initialize_materializes_defaults_and_resources() {
        let contents = sample_contents("smooth.base");
        let mode = contents.run.variable("mode").expect("mode");
        assert_eq!(mode.value, Some(Value::from("on")));
        assert_eq!(contents.resources.len(), 3);
        assert!(contents.resource("params").expect("params").parameter("alpha").is_some());
        assert_eq!(contents.run.container, sample_algorithm().container);
    }

    #[test]
    fn lookup_fails_with_not_found() {
        let contents = sample_contents("smooth.base");
        assert!(matches!(
            contents.run.variable("missing"),
            Err(Error::NotFound { kind: "variable", .. })
        ));
        assert!(matches!(
            contents.resource("mode"),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn validate_rejects_run_of_other_algorithm() {
        let mut contents = sample_contents("smooth.base");
        contents.run.name = "other.base".to_string();
        assert!(matches!(
            contents.validate(&sample_algorithm()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn disabled_inputs_are_excluded_and_skip_readiness() {
        let mut contents = sample_contents("smooth.base");
        {
            let threshold = contents.run.variable_mut("threshold").expect("threshold");
            threshold.value = None;
            threshold.disabled = true;
        }
        contents.check_ready().expect("disabled inputs are not required");
        assert!(!contents.enabled_inputs().contains(&"threshold"));

        contents.run.variable_mut("threshold").expect("threshold").disabled = false;
        assert!(matches!(contents.check_ready(), Err(Error::Validation(_))));
    }

    #[test]
    fn run_survives_serialization() {
        let mut contents = sample_contents("smooth.base");
        contents.run.variable_mut("threshold").expect("threshold").disabled = true;
        let encoded = serde_json::to_value(&contents.run).expect("serialize");
        let decoded: Run = serde_json::from_value(encoded).expect("deserialize");
        assert_eq!(decoded, contents.run);
    }
}
