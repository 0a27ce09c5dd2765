//! Argument validation against a normalized tool descriptor.
//!
//! Runs before a call is dispatched, so obviously malformed calls become
//! tool-result errors the LLM can correct instead of a server round-trip.
//! Unknown arguments are passed through; the server owns that decision.

use super::entities::{ParamType, ToolDescriptor};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a set of arguments was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArgumentError {
    #[error("missing required parameter '{param}' for tool '{tool}'")]
    MissingRequired { tool: String, param: String },

    #[error("parameter '{param}' of tool '{tool}' expects {expected}, got {found}")]
    TypeMismatch {
        tool: String,
        param: String,
        expected: ParamType,
        found: String,
    },

    #[error("parameter '{param}' of tool '{tool}' must be one of {allowed}")]
    NotInEnum {
        tool: String,
        param: String,
        allowed: String,
    },
}

/// Check `arguments` against `descriptor`.
///
/// Explicit `null` counts as absent, matching how optional parameters are
/// declared by pydantic-based servers.
pub fn validate_arguments(
    descriptor: &ToolDescriptor,
    arguments: &Map<String, Value>,
) -> Result<(), ArgumentError> {
    for param in &descriptor.parameters {
        let value = arguments.get(&param.name).filter(|v| !v.is_null());

        let Some(value) = value else {
            if param.required {
                return Err(ArgumentError::MissingRequired {
                    tool: descriptor.name.clone(),
                    param: param.name.clone(),
                });
            }
            continue;
        };

        if !param.param_type.accepts(value) {
            return Err(ArgumentError::TypeMismatch {
                tool: descriptor.name.clone(),
                param: param.name.clone(),
                expected: param.param_type,
                found: describe(value),
            });
        }

        if !param.enum_values.is_empty() && !param.enum_values.contains(value) {
            return Err(ArgumentError::NotInEnum {
                tool: descriptor.name.clone(),
                param: param.name.clone(),
                allowed: Value::Array(param.enum_values.clone()).to_string(),
            });
        }
    }
    Ok(())
}

fn describe(value: &Value) -> String {
    ParamType::of_value(value)
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|| "null".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::entities::ToolParameter;
    use serde_json::json;

    fn descriptor() -> ToolDescriptor {
        let mut mode = ToolParameter::new("mode", ParamType::String);
        mode.enum_values = vec![json!("fast"), json!("safe")];
        ToolDescriptor::new("s", "submit", "Submit a job")
            .with_parameter(ToolParameter::new("script", ParamType::String).required())
            .with_parameter(ToolParameter::new("nodes", ParamType::Integer))
            .with_parameter(mode)
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_arguments() {
        let result = validate_arguments(&descriptor(), &args(json!({"script": "a.sh", "nodes": 2})));
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = validate_arguments(&descriptor(), &args(json!({"nodes": 2}))).unwrap_err();
        assert!(matches!(err, ArgumentError::MissingRequired { ref param, .. } if param == "script"));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let err = validate_arguments(&descriptor(), &args(json!({"script": null}))).unwrap_err();
        assert!(matches!(err, ArgumentError::MissingRequired { .. }));
        assert!(validate_arguments(&descriptor(), &args(json!({"script": "x", "nodes": null}))).is_ok());
    }

    #[test]
    fn test_type_mismatch() {
        let err =
            validate_arguments(&descriptor(), &args(json!({"script": "a", "nodes": "two"}))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "parameter 'nodes' of tool 'submit' expects integer, got string"
        );
    }

    #[test]
    fn test_enum_violation() {
        let err =
            validate_arguments(&descriptor(), &args(json!({"script": "a", "mode": "slow"}))).unwrap_err();
        assert!(matches!(err, ArgumentError::NotInEnum { .. }));
    }

    #[test]
    fn test_unknown_arguments_pass_through() {
        let result = validate_arguments(&descriptor(), &args(json!({"script": "a", "extra": 1})));
        assert!(result.is_ok());
    }
}
