//! Variable declarations and instances, plus strict value checking.

use std::fmt;

use jsonschema::validator_for;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Number;

use crate::core::value::{Binding, ResourceRef, Value};
use crate::error::{Error, Result};

/// Declared variable type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Number,
    Boolean,
    Resource,
}

impl VariableType {
    pub fn is_scalar(self) -> bool {
        self != VariableType::Resource
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VariableType::String => "string",
            VariableType::Number => "number",
            VariableType::Boolean => "boolean",
            VariableType::Resource => "resource",
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A variable as declared in an algorithm signature and instantiated in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Variable {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: VariableType,
    #[serde(rename = "null", default, skip_serializing_if = "is_false")]
    pub nullable: bool,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceRef>,
    /// JSON Schema constraining a scalar value.
    #[serde(
        default,
        deserialize_with = "non_null_metaschema",
        skip_serializing_if = "Option::is_none"
    )]
    pub metaschema: Option<serde_json::Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// An absent `metaschema` means "unconstrained"; an explicit `null` is refused.
pub(crate) fn non_null_metaschema<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let schema = serde_json::Value::deserialize(deserializer)?;
    if schema.is_null() {
        return Err(D::Error::custom(
            "metaschema must be a JSON Schema; omit the field instead of null",
        ));
    }
    Ok(Some(schema))
}

impl Variable {
    /// Minimal declaration with every optional field empty.
    pub fn new(name: impl Into<String>, kind: VariableType) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            kind,
            nullable: false,
            allowed: None,
            default: None,
            disabled: false,
            value: None,
            resource: None,
            metaschema: None,
        }
    }

    pub fn binding(&self) -> Option<Binding> {
        match self.kind {
            VariableType::Resource => self.resource.clone().map(Binding::Resource),
            _ => self.value.clone().map(Binding::Value),
        }
    }

    /// Check a candidate value against type, nullability, enum, and metaschema.
    ///
    /// Never coerces: a `"3"` string is rejected for a `number` variable.
    pub fn check(&self, candidate: Option<&Value>) -> Result<()> {
        let Some(value) = candidate else {
            if self.nullable {
                return Ok(());
            }
            return Err(Error::Constraint {
                variable: self.name.clone(),
                message: "value is required (variable is not nullable)".to_string(),
            });
        };

        let type_ok = matches!(
            (self.kind, value),
            (VariableType::String, Value::String(_))
                | (VariableType::Number, Value::Number(_))
                | (VariableType::Boolean, Value::Boolean(_))
        );
        if !type_ok {
            return Err(Error::TypeMismatch {
                variable: self.name.clone(),
                expected: self.kind.to_string(),
                found: value.type_name().to_string(),
            });
        }

        if let Some(allowed) = &self.allowed
            && !allowed.iter().any(|candidate| candidate.matches(value))
        {
            let options = allowed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::Constraint {
                variable: self.name.clone(),
                message: format!("{value} is not one of [{options}]"),
            });
        }

        if let Some(schema) = &self.metaschema {
            self.check_metaschema(schema, value)?;
        }
        Ok(())
    }

    fn check_metaschema(&self, schema: &serde_json::Value, value: &Value) -> Result<()> {
        let validator = validator_for(schema).map_err(|err| {
            Error::Validation(format!("metaschema of '{}' is invalid: {err}", self.name))
        })?;
        let instance = value.to_json();
        let messages = validator
            .iter_errors(&instance)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        if !messages.is_empty() {
            return Err(Error::Constraint {
                variable: self.name.clone(),
                message: messages.join("; "),
            });
        }
        Ok(())
    }

    /// Parse raw text for this variable's declared type, then check it.
    pub fn parse(&self, raw: &str) -> Result<Value> {
        let mismatch = || Error::TypeMismatch {
            variable: self.name.clone(),
            expected: self.kind.to_string(),
            found: format!("{raw:?}"),
        };
        let value = match self.kind {
            VariableType::String => Value::String(raw.to_string()),
            VariableType::Number => {
                let number: Number = serde_json::from_str(raw).map_err(|_| mismatch())?;
                if raw.trim() != raw {
                    return Err(mismatch());
                }
                Value::Number(number)
            }
            VariableType::Boolean => match raw {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                _ => return Err(mismatch()),
            },
            VariableType::Resource => {
                return Err(Error::TypeMismatch {
                    variable: self.name.clone(),
                    expected: "a resource file (use load)".to_string(),
                    found: format!("{raw:?}"),
                });
            }
        };
        self.check(Some(&value))?;
        Ok(value)
    }

    /// Structural checks for a signature declaration.
    ///
    /// `is_input` adds the requirement that non-nullable scalars carry a default.
    pub fn validate_declaration(&self, is_input: bool) -> Result<()> {
        let invalid = |message: &str| Error::Validation(format!("variable '{}': {message}", self.name));
        if self.name.trim().is_empty() {
            return Err(Error::Validation("variable name must not be empty".to_string()));
        }
        if self.kind.is_scalar() {
            if self.resource.is_some() {
                return Err(invalid("scalar variables cannot reference a resource"));
            }
            if self.default.is_some() {
                self.check(self.default.as_ref())?;
            } else if is_input && !self.nullable {
                return Err(invalid("non-nullable input needs a default"));
            }
            if let Some(allowed) = &self.allowed {
                for option in allowed {
                    if option.type_name() != self.kind.as_str() {
                        return Err(invalid("enum values must match the declared type"));
                    }
                }
            }
        } else {
            if self.resource.is_none() {
                return Err(invalid("resource variables need a resource reference"));
            }
            if self.value.is_some() || self.default.is_some() || self.allowed.is_some() {
                return Err(invalid("resource variables cannot carry scalar values"));
            }
        }
        Ok(())
    }
}
