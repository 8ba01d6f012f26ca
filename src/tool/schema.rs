// ABOUTME: Validates tool arguments against the JSON Schema each tool declares.
// ABOUTME: Maps jsonschema errors onto dotted-path SchemaIssues.

use jsonschema::error::ValidationErrorKind;
use serde_json::Value;

use crate::error::SchemaIssue;

/// Validate `value` against `schema`, collecting every violation.
///
/// A schema that does not compile is reported as a single root issue.
pub fn validate_args(schema: &Value, value: &Value) -> Vec<SchemaIssue> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(e) => return vec![SchemaIssue::new("", format!("invalid tool schema: {}", e))],
    };

    let mut issues = Vec::new();
    for error in validator.iter_errors(value) {
        let path = dotted(&error.instance_path().to_string());
        match error.kind() {
            ValidationErrorKind::Required { property } => {
                let name = property.as_str().map(str::to_string);
                let name = name.unwrap_or_else(|| property.to_string());
                issues.push(SchemaIssue::new(join(&path, &name), "is required"));
            }
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                for name in unexpected {
                    issues.push(SchemaIssue::new(join(&path, name), "is not allowed"));
                }
            }
            _ => issues.push(SchemaIssue::new(path, error.to_string())),
        }
    }
    issues
}

// "/tags/1" -> "tags.1"
fn dotted(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}
