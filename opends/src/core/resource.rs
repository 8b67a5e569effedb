//! Tabular and parameter resources bound to resource-typed variables.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single data row keyed by field name.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceProfile {
    #[serde(rename = "tabular-data-resource")]
    Tabular,
    #[serde(rename = "parameter-tabular-data-resource")]
    Parameter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Datetime,
    Object,
    Array,
    Any,
}

impl FieldType {
    /// Whether a non-null cell is acceptable for this field type.
    fn accepts(self, cell: &serde_json::Value) -> bool {
        match self {
            FieldType::String => cell.is_string(),
            FieldType::Number => cell.is_number(),
            FieldType::Integer => cell.is_i64() || cell.is_u64(),
            FieldType::Boolean => cell.is_boolean(),
            FieldType::Date | FieldType::Datetime => cell.is_string(),
            FieldType::Object => cell.is_object(),
            FieldType::Array => cell.is_array(),
            FieldType::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            kind,
            title: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// A named data container owned by exactly one run variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Resource {
    pub name: String,
    pub profile: ResourceProfile,
    #[serde(default)]
    pub schema: Schema,
    #[serde(default)]
    pub data: Vec<Row>,
}

/// Parameter tables are keyed by this column.
pub const PARAMETER_KEY: &str = "name";
/// Every parameter row carries an initial value in this column.
pub const PARAMETER_INIT: &str = "init";

impl Resource {
    /// Check resource name, row columns, cell types, and parameter-table keys.
    pub fn validate(&self) -> Result<()> {
        validate_resource_name(&self.name)?;
        let invalid = |message: String| Error::Validation(format!("resource '{}': {message}", self.name));

        let mut field_names = HashSet::new();
        for field in &self.schema.fields {
            if !field_names.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
        }

        for (index, row) in self.data.iter().enumerate() {
            for (column, cell) in row {
                let field = self
                    .schema
                    .field(column)
                    .ok_or_else(|| invalid(format!("row {index}: unknown column '{column}'")))?;
                if !cell.is_null() && !field.kind.accepts(cell) {
                    return Err(invalid(format!(
                        "row {index}: column '{column}' is not a valid {:?}",
                        field.kind
                    )));
                }
            }
        }

        if self.profile == ResourceProfile::Parameter {
            self.validate_parameters()?;
        }
        Ok(())
    }

    fn validate_parameters(&self) -> Result<()> {
        let invalid = |message: String| Error::Validation(format!("resource '{}': {message}", self.name));
        for required in [PARAMETER_KEY, PARAMETER_INIT] {
            if self.schema.field(required).is_none() {
                return Err(invalid(format!("parameter resources need a '{required}' field")));
            }
        }
        let mut seen = HashSet::new();
        for (index, row) in self.data.iter().enumerate() {
            let name = row
                .get(PARAMETER_KEY)
                .and_then(|cell| cell.as_str())
                .filter(|name| !name.is_empty())
                .ok_or_else(|| invalid(format!("row {index}: missing parameter name")))?;
            if !seen.insert(name) {
                return Err(invalid(format!("duplicate parameter '{name}'")));
            }
            if row.get(PARAMETER_INIT).is_none_or(|cell| cell.is_null()) {
                return Err(invalid(format!("parameter '{name}' has no init value")));
            }
        }
        Ok(())
    }

    /// Look up a parameter row by name.
    pub fn parameter(&self, name: &str) -> Option<&Row> {
        self.data
            .iter()
            .find(|row| row.get(PARAMETER_KEY).and_then(|cell| cell.as_str()) == Some(name))
    }
}

/// Resource names become file names, so they are restricted to `[A-Za-z0-9_-]`.
pub fn validate_resource_name(name: &str) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::Validation(format!(
            "resource name must be [A-Za-z0-9_-]+ (got '{name}')"
        )));
    }
    Ok(())
}

/// New content for an existing resource, as read by `load`.
///
/// Either a bare array of rows or an object with `data` and optional `schema`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ResourceUpload {
    Rows(Vec<Row>),
    Table {
        #[serde(default)]
        schema: Option<Schema>,
        data: Vec<Row>,
    },
}

impl ResourceUpload {
    /// Replace data (and schema, when supplied) on `resource`, keeping name and profile.
    pub fn apply_to(self, resource: &mut Resource) {
        match self {
            ResourceUpload::Rows(rows) => resource.data = rows,
            ResourceUpload::Table { schema, data } => {
                if let Some(schema) = schema {
                    resource.schema = schema;
                }
                resource.data = data;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parameters(data: serde_json::Value) -> Resource {
        serde_json::from_value(json!({
            "name": "params",
            "profile": "parameter-tabular-data-resource",
            "schema": {"fields": [
                {"name": "name", "type": "string"},
                {"name": "init", "type": "number"}
            ]},
            "data": data
        }))
        .expect("resource")
    }

    #[test]
    fn parameter_rows_need_init() {
        parameters(json!([{"name": "alpha", "init": 1}]))
            .validate()
            .expect("valid");
        let err = parameters(json!([{"name": "alpha"}])).validate().unwrap_err();
        assert!(err.to_string().contains("no init value"));
    }

    #[test]
    fn parameter_names_are_unique() {
        let err = parameters(json!([
            {"name": "alpha", "init": 1},
            {"name": "alpha", "init": 2}
        ]))
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("duplicate parameter"));
    }

    #[test]
    fn rejects_unknown_columns_and_bad_cells() {
        let err = parameters(json!([{"name": "a", "init": 1, "extra": 2}]))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("unknown column"));

        let err = parameters(json!([{"name": "a", "init": "high"}]))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("not a valid"));
    }

    #[test]
    fn tabular_resources_have_no_key_constraint() {
        let resource: Resource = serde_json::from_value(json!({
            "name": "table",
            "profile": "tabular-data-resource",
            "schema": {"fields": [{"name": "x", "type": "integer"}]},
            "data": [{"x": 1}, {"x": 1}, {"x": null}]
        }))
        .expect("resource");
        resource.validate().expect("valid");
    }

    #[test]
    fn upload_keeps_schema_unless_supplied() {
        let mut resource = parameters(json!([]));
        let rows: ResourceUpload =
            serde_json::from_value(json!([{"name": "beta", "init": 2}])).expect("rows");
        rows.apply_to(&mut resource);
        assert_eq!(resource.schema.fields.len(), 2);
        assert!(resource.parameter("beta").is_some());

        let table: ResourceUpload = serde_json::from_value(json!({
            "schema": {"fields": [{"name": "name", "type": "string"}, {"name": "init", "type": "any"}]},
            "data": [{"name": "gamma", "init": "x"}]
        }))
        .expect("table");
        table.apply_to(&mut resource);
        assert_eq!(resource.schema.fields[1].kind, FieldType::Any);
        resource.validate().expect("valid");
    }

    #[test]
    fn both_profiles_survive_serialization() {
        let templates = crate::test_support::sample_templates();
        let params = &templates["params"];
        let table = &templates["table"];
        assert_eq!(params.profile, ResourceProfile::Parameter);
        assert_eq!(table.profile, ResourceProfile::Tabular);
        for resource in [params, table] {
            let encoded = serde_json::to_value(resource).expect("serialize");
            let decoded: Resource = serde_json::from_value(encoded).expect("deserialize");
            assert_eq!(&decoded, resource);
        }
    }
}
