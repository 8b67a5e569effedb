//! Declarative relationships: how a source variable's value cascades to targets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::resource::{Row, Schema};
use crate::core::value::Value;
use crate::core::variable::non_null_metaschema;

/// Rule kind. Only `value` has defined semantics; anything else is kept
/// verbatim so it can be refused explicitly instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleKind {
    Value,
    Other(String),
}

impl From<String> for RuleKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "value" => RuleKind::Value,
            _ => RuleKind::Other(kind),
        }
    }
}

impl From<RuleKind> for String {
    fn from(kind: RuleKind) -> Self {
        match kind {
            RuleKind::Value => "value".to_string(),
            RuleKind::Other(kind) => kind,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Value => f.write_str("value"),
            RuleKind::Other(kind) => f.write_str(kind),
        }
    }
}

/// What a target modifies: a scalar variable or the resource behind one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TargetKind {
    Value,
    Resource,
    Other(String),
}

impl From<String> for TargetKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "value" => TargetKind::Value,
            "resource" => TargetKind::Resource,
            _ => TargetKind::Other(kind),
        }
    }
}

impl From<TargetKind> for String {
    fn from(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Value => "value".to_string(),
            TargetKind::Resource => "resource".to_string(),
            TargetKind::Other(kind) => kind,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from(self.clone()))
    }
}

/// One effect of a matching rule. Omitted fields leave the target untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TargetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(
        default,
        deserialize_with = "non_null_metaschema",
        skip_serializing_if = "Option::is_none"
    )]
    pub metaschema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
}

impl Target {
    pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value: None,
            metaschema: None,
            disabled: None,
            schema: None,
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    #[serde(rename = "type")]
    pub kind: RuleKind,
    /// Trigger values; the rule matches when the source value is one of these.
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl Rule {
    pub fn triggered_by(&self, current: Option<&Value>) -> bool {
        current.is_some_and(|current| self.values.iter().any(|value| value.matches(current)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Relationship {
    pub source: String,
    pub rules: Vec<Rule>,
}

impl Relationship {
    /// Names of every variable this relationship can modify, in declaration order.
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .flat_map(|rule| rule.targets.iter().map(|target| target.name.as_str()))
    }
}

/// Standalone relationship file (`relationships.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipFile {
    pub relationships: Vec<Relationship>,
}
