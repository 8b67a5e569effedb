//! Algorithm definitions: signature, container, and relationships.
//!
//! An algorithm is read-only with respect to its runs. [`Algorithm::validate`]
//! checks the whole definition so that later operations can assume a
//! consistent signature and relationship graph.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::relationship::{Relationship, RuleKind, TargetKind};
use crate::core::run::is_identifier;
use crate::core::variable::{Variable, VariableType};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Signature {
    pub inputs: Vec<Variable>,
    pub outputs: Vec<Variable>,
}

impl Signature {
    /// Inputs followed by outputs.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables().find(|var| var.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Algorithm {
    pub name: String,
    pub title: String,
    pub profile: String,
    /// Entry point inside the container (opaque to this crate).
    pub code: String,
    /// Container image that executes the algorithm.
    pub container: String,
    pub signature: Signature,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Algorithm {
    pub fn relationship(&self, source: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|rel| rel.source == source)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.name) {
            return Err(Error::Validation(format!(
                "algorithm name must be [A-Za-z0-9_]+ (got '{}')",
                self.name
            )));
        }
        if self.container.trim().is_empty() {
            return Err(Error::Validation(format!(
                "algorithm '{}' has no container",
                self.name
            )));
        }

        let mut names = HashSet::new();
        let mut resources = HashSet::new();
        for (var, is_input) in self
            .signature
            .inputs
            .iter()
            .map(|var| (var, true))
            .chain(self.signature.outputs.iter().map(|var| (var, false)))
        {
            if !names.insert(var.name.as_str()) {
                return Err(Error::Validation(format!(
                    "duplicate variable '{}' in signature of '{}'",
                    var.name, self.name
                )));
            }
            var.validate_declaration(is_input)?;
            if let Some(resource) = &var.resource
                && !resources.insert(resource.as_str())
            {
                return Err(Error::Validation(format!(
                    "resource '{resource}' is bound to more than one variable"
                )));
            }
        }

        self.validate_relationships()?;
        if let Some(cycle) = find_cycle(&self.relationship_graph()) {
            return Err(Error::Validation(format!(
                "relationship cycle: {}",
                cycle.join(" -> ")
            )));
        }
        Ok(())
    }

    fn validate_relationships(&self) -> Result<()> {
        let mut sources = HashSet::new();
        for rel in &self.relationships {
            let invalid =
                |message: String| Error::Validation(format!("relationship '{}': {message}", rel.source));
            if !sources.insert(rel.source.as_str()) {
                return Err(invalid("source declared more than once".to_string()));
            }
            let source = self
                .signature
                .variable(&rel.source)
                .ok_or_else(|| invalid("source is not a signature variable".to_string()))?;

            for rule in &rel.rules {
                if let RuleKind::Other(kind) = &rule.kind {
                    return Err(Error::UnsupportedRule {
                        what: "rule type",
                        kind: kind.clone(),
                    });
                }
                for trigger in &rule.values {
                    if trigger.type_name() != source.kind.as_str() {
                        return Err(invalid(format!(
                            "trigger {trigger} does not match source type {}",
                            source.kind
                        )));
                    }
                }
                for target in &rule.targets {
                    let var = self.signature.variable(&target.name).ok_or_else(|| {
                        invalid(format!("target '{}' is not a signature variable", target.name))
                    })?;
                    match &target.kind {
                        TargetKind::Value => {
                            if var.kind == VariableType::Resource {
                                return Err(invalid(format!(
                                    "value target '{}' is a resource variable",
                                    target.name
                                )));
                            }
                            if target.schema.is_some() || target.data.is_some() {
                                return Err(invalid(format!(
                                    "value target '{}' cannot carry schema or data",
                                    target.name
                                )));
                            }
                            if let Some(value) = &target.value
                                && value.type_name() != var.kind.as_str()
                            {
                                return Err(invalid(format!(
                                    "target '{}' value {value} is not a {}",
                                    target.name, var.kind
                                )));
                            }
                        }
                        TargetKind::Resource => {
                            if var.kind != VariableType::Resource {
                                return Err(invalid(format!(
                                    "resource target '{}' is a {} variable",
                                    target.name, var.kind
                                )));
                            }
                            if target.value.is_some() || target.metaschema.is_some() {
                                return Err(invalid(format!(
                                    "resource target '{}' cannot carry value or metaschema",
                                    target.name
                                )));
                            }
                        }
                        TargetKind::Other(kind) => {
                            return Err(Error::UnsupportedRule {
                                what: "target type",
                                kind: kind.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Source -> targets adjacency over all relationships.
    pub fn relationship_graph(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut graph: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for rel in &self.relationships {
            let edges = graph.entry(rel.source.as_str()).or_default();
            for target in rel.target_names() {
                if !edges.contains(&target) {
                    edges.push(target);
                }
            }
        }
        graph
    }

    /// Edges `(a, b)` where `b` is itself a relationship source.
    ///
    /// Propagation is single-hop, so `b`'s own relationship is not evaluated
    /// when `a` modifies it.
    pub fn multi_hop_edges(&self) -> Vec<(&str, &str)> {
        let graph = self.relationship_graph();
        let mut edges = Vec::new();
        for (source, targets) in &graph {
            for target in targets {
                if graph.contains_key(target) {
                    edges.push((*source, *target));
                }
            }
        }
        edges
    }
}

/// Depth-first search for a cycle; returns the path including the repeated node.
fn find_cycle<'a>(graph: &BTreeMap<&'a str, Vec<&'a str>>) -> Option<Vec<&'a str>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        node: &'a str,
        graph: &BTreeMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<&'a str>> {
        match marks.get(node) {
            Some(Mark::Visiting) => {
                let start = path.iter().position(|seen| *seen == node).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(node);
                return Some(cycle);
            }
            Some(Mark::Done) => return None,
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        path.push(node);
        for next in graph.get(node).into_iter().flatten() {
            if let Some(cycle) = visit(next, graph, marks, path) {
                return Some(cycle);
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    for node in graph.keys() {
        let mut path = Vec::new();
        if let Some(cycle) = visit(node, graph, &mut marks, &mut path) {
            return Some(cycle);
        }
    }
    None
}
