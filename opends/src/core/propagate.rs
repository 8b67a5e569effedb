//! Relationship propagation.
//!
//! Given a run and the name of a variable that just changed, evaluate the
//! relationship declared for that variable and apply the targets of every
//! matching rule. Propagation works on a copy of the run contents: either the
//! whole cascade succeeds and the caller receives the new contents, or an
//! error is returned and the input is untouched.
//!
//! Propagation is single-hop. Targets modified here do not trigger their own
//! relationships.

use crate::core::relationship::{Relationship, RuleKind, Target, TargetKind};
use crate::core::run::RunContents;
use crate::core::variable::VariableType;
use crate::error::{Error, Result};

/// What a propagation pass did, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationReport {
    pub source: String,
    /// Indices of rules whose trigger matched.
    pub matched_rules: Vec<usize>,
    /// Target variable names, once per application.
    pub applied: Vec<String>,
}

impl PropagationReport {
    pub fn is_noop(&self) -> bool {
        self.matched_rules.is_empty()
    }
}

/// Evaluate the relationship for `source` against `contents`.
///
/// A source without a relationship is a no-op. Errors leave `contents` as is.
pub fn propagate(
    relationships: &[Relationship],
    contents: &RunContents,
    source: &str,
) -> Result<(RunContents, PropagationReport)> {
    let mut report = PropagationReport {
        source: source.to_string(),
        ..PropagationReport::default()
    };

    let mut matching = relationships.iter().filter(|rel| rel.source == source);
    let Some(relationship) = matching.next() else {
        return Ok((contents.clone(), report));
    };
    if matching.next().is_some() {
        return Err(Error::Validation(format!(
            "more than one relationship declared for '{source}'"
        )));
    }

    let current = contents.run.variable(source)?.value.clone();
    let mut next = contents.clone();

    for (index, rule) in relationship.rules.iter().enumerate() {
        if let RuleKind::Other(kind) = &rule.kind {
            return Err(Error::UnsupportedRule {
                what: "rule type",
                kind: kind.clone(),
            });
        }
        if !rule.triggered_by(current.as_ref()) {
            continue;
        }
        report.matched_rules.push(index);
        for target in &rule.targets {
            apply_target(&mut next, target)?;
            report.applied.push(target.name.clone());
        }
    }

    Ok((next, report))
}

fn apply_target(contents: &mut RunContents, target: &Target) -> Result<()> {
    let var = contents.run.variable_mut(&target.name)?;
    if let Some(disabled) = target.disabled {
        var.disabled = disabled;
    }

    match &target.kind {
        TargetKind::Resource => {
            if var.kind != VariableType::Resource {
                return Err(Error::TypeMismatch {
                    variable: target.name.clone(),
                    expected: var.kind.to_string(),
                    found: "resource target".to_string(),
                });
            }
            let resource = contents.resource_mut(&target.name)?;
            if let Some(schema) = &target.schema {
                resource.schema = schema.clone();
            }
            if let Some(data) = &target.data {
                resource.data = data.clone();
            }
            resource.validate()?;
        }
        TargetKind::Value => {
            if !var.kind.is_scalar() {
                return Err(Error::TypeMismatch {
                    variable: target.name.clone(),
                    expected: var.kind.to_string(),
                    found: "value target".to_string(),
                });
            }
            if let Some(metaschema) = &target.metaschema {
                var.metaschema = Some(metaschema.clone());
            }
            if let Some(value) = &target.value {
                var.value = Some(value.clone());
            }
            // The value left in place must satisfy the constraints now in force.
            if (target.value.is_some() || target.metaschema.is_some()) && var.value.is_some() {
                var.check(var.value.as_ref())?;
            }
        }
        TargetKind::Other(kind) => {
            return Err(Error::UnsupportedRule {
                what: "target type",
                kind: kind.clone(),
            });
        }
    }
    Ok(())
}
