//! Loading algorithm definitions and their resource templates.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::core::algorithm::Algorithm;
use crate::core::relationship::RelationshipFile;
use crate::core::resource::Resource;
use crate::error::{Error, Result};
use crate::io::json::read_json;
use crate::io::paths::PackagePaths;

/// Load and validate `algorithms/<name>/algorithm.json`.
///
/// Relationships from an optional `relationships.json` are appended to the
/// embedded list before validation.
pub fn load_algorithm(paths: &PackagePaths, name: &str) -> Result<Algorithm> {
    let mut algorithm: Algorithm = read_json(&paths.algorithm_path(name), "algorithm")?;
    if algorithm.name != name {
        return Err(Error::Validation(format!(
            "algorithm in directory '{name}' is named '{}'",
            algorithm.name
        )));
    }

    let relationships_path = paths.relationships_path(name);
    if relationships_path.exists() {
        let file: RelationshipFile = read_json(&relationships_path, "relationships")?;
        algorithm.relationships.extend(file.relationships);
    }

    algorithm.validate()?;
    for (source, target) in algorithm.multi_hop_edges() {
        warn!(
            algorithm = %algorithm.name,
            source,
            target,
            "relationship target is itself a source; propagation is single-hop"
        );
    }
    debug!(
        algorithm = %algorithm.name,
        inputs = algorithm.signature.inputs.len(),
        outputs = algorithm.signature.outputs.len(),
        relationships = algorithm.relationships.len(),
        "algorithm loaded"
    );
    Ok(algorithm)
}

/// Load the template of every resource referenced by the signature.
pub fn load_resource_templates(
    paths: &PackagePaths,
    algorithm: &Algorithm,
) -> Result<BTreeMap<String, Resource>> {
    let mut templates = BTreeMap::new();
    for var in algorithm.signature.variables() {
        let Some(reference) = &var.resource else {
            continue;
        };
        let path = paths.template_path(&algorithm.name, reference.as_str());
        let template: Resource = read_json(&path, "resource template").map_err(|err| match err {
            Error::NotFound { .. } => Error::Validation(format!(
                "variable '{}' references resource '{reference}' but {} is missing",
                var.name,
                path.display()
            )),
            other => other,
        })?;
        if template.name != reference.as_str() {
            return Err(Error::Validation(format!(
                "template {} is named '{}'",
                path.display(),
                template.name
            )));
        }
        template.validate()?;
        templates.insert(template.name.clone(), template);
    }
    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::json::write_json;
    use crate::test_support::TestPackage;
    use serde_json::json;

    #[test]
    fn loads_sample_algorithm_with_templates() {
        let pkg = TestPackage::new().expect("package");
        let algorithm = load_algorithm(pkg.paths(), "smooth").expect("algorithm");
        let templates = load_resource_templates(pkg.paths(), &algorithm).expect("templates");
        assert_eq!(
            templates.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["params", "result", "table"]
        );
    }

    #[test]
    fn relationships_file_is_appended() {
        let pkg = TestPackage::new().expect("package");
        write_json(
            &pkg.paths().relationships_path("smooth"),
            &json!({"relationships": [{
                "source": "threshold",
                "rules": [{"type": "value", "values": [0], "targets": [
                    {"name": "table", "type": "resource", "data": []}]}]
            }]}),
        )
        .expect("write relationships");
        let algorithm = load_algorithm(pkg.paths(), "smooth").expect("algorithm");
        assert!(algorithm.relationship("threshold").is_some());
        assert!(algorithm.relationship("mode").is_some());
    }

    #[test]
    fn duplicate_source_across_files_is_rejected() {
        let pkg = TestPackage::new().expect("package");
        write_json(
            &pkg.paths().relationships_path("smooth"),
            &json!({"relationships": [{"source": "mode", "rules": []}]}),
        )
        .expect("write relationships");
        let err = load_algorithm(pkg.paths(), "smooth").unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn missing_template_is_a_validation_error() {
        let pkg = TestPackage::new().expect("package");
        std::fs::remove_file(pkg.paths().template_path("smooth", "table")).expect("remove");
        let algorithm = load_algorithm(pkg.paths(), "smooth").expect("algorithm");
        let err = load_resource_templates(pkg.paths(), &algorithm).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn missing_algorithm_is_not_found() {
        let pkg = TestPackage::new().expect("package");
        let err = load_algorithm(pkg.paths(), "nope").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "algorithm", .. }));
    }
}
