//! Schema normalization
//!
//! MCP servers describe their tools in several dialects of JSON Schema.
//! Everything downstream (validation, LLM adapters) works with one
//! normalized [`ToolDescriptor`], produced here from the raw `tools/list`
//! entry.
//!
//! Accepted dialects:
//!
//! | Dialect | Example |
//! |---------|---------|
//! | Standard MCP | `{"inputSchema": {"type": "object", "properties": {...}, "required": [...]}}` |
//! | Snake-case key | `{"input_schema": {...}}` |
//! | Function-style key | `{"parameters": {...}}` |
//! | Pydantic optionals | `{"anyOf": [{"type": "integer"}, {"type": "null"}], "default": null}` |
//! | Pydantic models | `{"$ref": "#/$defs/Options"}` with `$defs` / `definitions` |
//! | Nullable type arrays | `{"type": ["string", "null"]}` |
//! | Legacy per-property required | `{"path": {"type": "string", "required": true}}` |
//! | Missing `type` | inferred from `enum`, `items` or `properties`, else string |

use super::entities::{ParamType, ToolDescriptor, ToolParameter};
use serde_json::{Map, Value};
use thiserror::Error;

/// Keys under which servers put the input schema, in lookup order.
const SCHEMA_KEYS: [&str; 3] = ["inputSchema", "input_schema", "parameters"];

/// Maximum `$ref` nesting followed before giving up (guards cyclic refs).
const MAX_REF_DEPTH: usize = 16;

/// Errors that make a raw tool entry unusable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("tool entry from server '{server}' has no name")]
    MissingName { server: String },

    #[error("tool '{tool}' on server '{server}' has a non-object input schema")]
    InvalidSchema { server: String, tool: String },
}

/// Normalize one raw `tools/list` entry into a [`ToolDescriptor`].
pub fn normalize_tool(server: &str, raw: &Value) -> Result<ToolDescriptor, SchemaError> {
    let name = raw
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SchemaError::MissingName {
            server: server.to_string(),
        })?;

    let description = raw
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();

    let mut descriptor = ToolDescriptor::new(server, name, description);

    let schema = match SCHEMA_KEYS.iter().find_map(|k| raw.get(*k)) {
        None | Some(Value::Null) => return Ok(descriptor),
        Some(Value::Object(obj)) => obj,
        Some(_) => {
            return Err(SchemaError::InvalidSchema {
                server: server.to_string(),
                tool: name.to_string(),
            });
        }
    };

    let defs = collect_definitions(schema);
    let required_list: Vec<&str> = schema
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    if let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) {
        for (prop_name, prop) in properties {
            let legacy_required = prop.get("required").and_then(|v| v.as_bool()) == Some(true);
            let mut param = normalize_property(prop_name, prop, &defs);
            param.required = legacy_required || required_list.contains(&prop_name.as_str());
            descriptor.parameters.push(param);
        }
    }

    Ok(descriptor)
}

/// Normalize a full `tools/list` result, skipping (and reporting) unusable
/// entries instead of failing the whole listing.
pub fn normalize_tools(server: &str, raw_tools: &[Value]) -> (Vec<ToolDescriptor>, Vec<SchemaError>) {
    let mut tools = Vec::with_capacity(raw_tools.len());
    let mut errors = Vec::new();
    for raw in raw_tools {
        match normalize_tool(server, raw) {
            Ok(tool) => tools.push(tool),
            Err(e) => errors.push(e),
        }
    }
    (tools, errors)
}

fn collect_definitions(schema: &Map<String, Value>) -> Map<String, Value> {
    let mut defs = Map::new();
    for key in ["definitions", "$defs"] {
        if let Some(obj) = schema.get(key).and_then(|v| v.as_object()) {
            for (k, v) in obj {
                defs.insert(k.clone(), v.clone());
            }
        }
    }
    defs
}

fn normalize_property(name: &str, prop: &Value, defs: &Map<String, Value>) -> ToolParameter {
    let resolved = resolve_schema(prop, defs, 0);
    let param_type = infer_type(&resolved);

    let description = resolved
        .get("description")
        .or_else(|| prop.get("description"))
        .or_else(|| resolved.get("title"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let enum_values = resolved
        .get("enum")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let items = if param_type == ParamType::Array {
        resolved.get("items").map(infer_type)
    } else {
        None
    };

    let mut schema = match resolved {
        Value::Object(obj) => obj,
        _ => Map::new(),
    };
    schema.remove("required");
    schema.remove("title");
    schema.insert("type".into(), Value::String(param_type.as_str().into()));
    if !description.is_empty() {
        schema.insert("description".into(), Value::String(description.clone()));
    }

    ToolParameter {
        name: name.to_string(),
        description,
        param_type,
        required: false,
        enum_values,
        items,
        schema: Value::Object(schema),
    }
}

/// Inline `$ref`s, unwrap nullable `anyOf`/`oneOf` and single-element
/// `allOf`, and collapse nullable type arrays.
fn resolve_schema(value: &Value, defs: &Map<String, Value>, depth: usize) -> Value {
    let Some(obj) = value.as_object() else {
        return value.clone();
    };
    if depth > MAX_REF_DEPTH {
        return Value::Object(obj.clone());
    }

    if let Some(reference) = obj.get("$ref").and_then(|v| v.as_str()) {
        let target = reference
            .rsplit('/')
            .next()
            .and_then(|name| defs.get(name));
        if let Some(target) = target {
            let mut merged = match resolve_schema(target, defs, depth + 1) {
                Value::Object(m) => m,
                other => return other,
            };
            overlay_annotations(&mut merged, obj);
            return Value::Object(merged);
        }
    }

    for key in ["anyOf", "oneOf"] {
        if let Some(branches) = obj.get(key).and_then(|v| v.as_array()) {
            let non_null: Vec<&Value> = branches.iter().filter(|b| !is_null_schema(b)).collect();
            if let Some(first) = non_null.first() {
                let mut merged = match resolve_schema(first, defs, depth + 1) {
                    Value::Object(m) => m,
                    other => return other,
                };
                overlay_annotations(&mut merged, obj);
                return Value::Object(merged);
            }
        }
    }

    if let Some(all) = obj.get("allOf").and_then(|v| v.as_array())
        && all.len() == 1
    {
        let mut merged = match resolve_schema(&all[0], defs, depth + 1) {
            Value::Object(m) => m,
            other => return other,
        };
        overlay_annotations(&mut merged, obj);
        return Value::Object(merged);
    }

    let mut out = Map::new();
    for (k, v) in obj {
        let v = match k.as_str() {
            "type" => collapse_type(v),
            "items" => resolve_schema(v, defs, depth + 1),
            "properties" => match v.as_object() {
                Some(props) => Value::Object(
                    props
                        .iter()
                        .map(|(pk, pv)| (pk.clone(), resolve_schema(pv, defs, depth + 1)))
                        .collect(),
                ),
                None => v.clone(),
            },
            _ => v.clone(),
        };
        out.insert(k.clone(), v);
    }
    Value::Object(out)
}

/// Copy the outer schema's annotations onto the resolved branch.
fn overlay_annotations(target: &mut Map<String, Value>, outer: &Map<String, Value>) {
    for key in ["description", "title", "default"] {
        if let Some(v) = outer.get(key)
            && !v.is_null()
        {
            target.insert(key.into(), v.clone());
        }
    }
}

fn is_null_schema(value: &Value) -> bool {
    value.get("type").and_then(|t| t.as_str()) == Some("null")
}

fn collapse_type(value: &Value) -> Value {
    match value {
        Value::Array(types) => types
            .iter()
            .find(|t| t.as_str() != Some("null"))
            .cloned()
            .unwrap_or(Value::String("string".into())),
        other => other.clone(),
    }
}

fn infer_type(schema: &Value) -> ParamType {
    if let Some(t) = schema
        .get("type")
        .map(collapse_type)
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(ParamType::from_schema_type)
    {
        return t;
    }
    if let Some(first) = schema
        .get("enum")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
    {
        return ParamType::of_value(first).unwrap_or(ParamType::String);
    }
    if schema.get("items").is_some() {
        return ParamType::Array;
    }
    if schema.get("properties").is_some() {
        return ParamType::Object;
    }
    ParamType::String
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_mcp_schema() {
        let raw = json!({
            "name": "read_file",
            "description": "Read a file",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path"},
                    "limit": {"type": "integer"}
                },
                "required": ["path"]
            }
        });
        let tool = normalize_tool("fs", &raw).unwrap();
        assert_eq!(tool.name, "read_file");
        assert_eq!(tool.server, "fs");
        let path = tool.parameter("path").unwrap();
        assert!(path.required);
        assert_eq!(path.param_type, ParamType::String);
        assert_eq!(path.description, "File path");
        assert!(!tool.parameter("limit").unwrap().required);
    }

    #[test]
    fn test_alternate_schema_keys() {
        for key in ["input_schema", "parameters"] {
            let raw = json!({
                "name": "t",
                key: {"properties": {"n": {"type": "number"}}, "required": ["n"]}
            });
            let tool = normalize_tool("s", &raw).unwrap();
            assert_eq!(tool.parameters.len(), 1, "key {key}");
            assert_eq!(tool.parameters[0].param_type, ParamType::Number);
            assert!(tool.parameters[0].required);
        }
    }

    #[test]
    fn test_pydantic_optional_any_of() {
        let raw = json!({
            "name": "run",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "nodes": {
                        "anyOf": [{"type": "integer"}, {"type": "null"}],
                        "default": null,
                        "title": "Nodes",
                        "description": "Node count"
                    }
                }
            }
        });
        let tool = normalize_tool("slurm", &raw).unwrap();
        let nodes = tool.parameter("nodes").unwrap();
        assert_eq!(nodes.param_type, ParamType::Integer);
        assert_eq!(nodes.description, "Node count");
        assert!(!nodes.required);
        assert!(nodes.schema.get("anyOf").is_none());
        assert_eq!(nodes.schema["type"], "integer");
    }

    #[test]
    fn test_ref_into_defs() {
        let raw = json!({
            "name": "configure",
            "inputSchema": {
                "type": "object",
                "$defs": {
                    "Mode": {"type": "string", "enum": ["fast", "safe"]}
                },
                "properties": {
                    "mode": {"$ref": "#/$defs/Mode", "description": "Run mode"}
                },
                "required": ["mode"]
            }
        });
        let tool = normalize_tool("s", &raw).unwrap();
        let mode = tool.parameter("mode").unwrap();
        assert_eq!(mode.param_type, ParamType::String);
        assert_eq!(mode.enum_values, vec![json!("fast"), json!("safe")]);
        assert_eq!(mode.description, "Run mode");
        assert!(mode.required);
    }

    #[test]
    fn test_legacy_per_property_required() {
        let raw = json!({
            "name": "t",
            "inputSchema": {
                "properties": {"path": {"type": "string", "required": true}}
            }
        });
        let tool = normalize_tool("s", &raw).unwrap();
        let path = tool.parameter("path").unwrap();
        assert!(path.required);
        assert!(path.schema.get("required").is_none());
    }

    #[test]
    fn test_missing_type_inferred() {
        let raw = json!({
            "name": "t",
            "inputSchema": {
                "properties": {
                    "level": {"enum": [1, 2, 3]},
                    "tags": {"items": {"type": "string"}},
                    "opts": {"properties": {"a": {"type": "boolean"}}},
                    "free": {"description": "anything"}
                }
            }
        });
        let tool = normalize_tool("s", &raw).unwrap();
        assert_eq!(tool.parameter("level").unwrap().param_type, ParamType::Integer);
        let tags = tool.parameter("tags").unwrap();
        assert_eq!(tags.param_type, ParamType::Array);
        assert_eq!(tags.items, Some(ParamType::String));
        assert_eq!(tool.parameter("opts").unwrap().param_type, ParamType::Object);
        assert_eq!(tool.parameter("free").unwrap().param_type, ParamType::String);
    }

    #[test]
    fn test_nullable_type_array() {
        let raw = json!({
            "name": "t",
            "inputSchema": {"properties": {"x": {"type": ["null", "boolean"]}}}
        });
        let tool = normalize_tool("s", &raw).unwrap();
        assert_eq!(tool.parameter("x").unwrap().param_type, ParamType::Boolean);
    }

    #[test]
    fn test_no_schema_means_no_parameters() {
        let tool = normalize_tool("s", &json!({"name": "ping"})).unwrap();
        assert!(tool.parameters.is_empty());
        assert_eq!(tool.description, "");
    }

    #[test]
    fn test_missing_name_rejected() {
        let err = normalize_tool("s", &json!({"description": "nameless"})).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingName {
                server: "s".into()
            }
        );
    }

    #[test]
    fn test_non_object_schema_rejected() {
        let err = normalize_tool("s", &json!({"name": "t", "inputSchema": "oops"})).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSchema { .. }));
    }

    #[test]
    fn test_normalize_tools_skips_bad_entries() {
        let (tools, errors) = normalize_tools(
            "s",
            &[json!({"name": "good"}), json!({"nope": true}), json!({"name": "also_good"})],
        );
        assert_eq!(tools.len(), 2);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_cyclic_ref_terminates() {
        let raw = json!({
            "name": "t",
            "inputSchema": {
                "definitions": {"Node": {"$ref": "#/definitions/Node"}},
                "properties": {"n": {"$ref": "#/definitions/Node"}}
            }
        });
        let tool = normalize_tool("s", &raw).unwrap();
        assert_eq!(tool.parameters.len(), 1);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let raw = json!({
            "name": "t",
            "inputSchema": {
                "properties": {"a": {"anyOf": [{"type": "string"}, {"type": "null"}]}},
                "required": ["a"]
            }
        });
        let first = normalize_tool("s", &raw).unwrap();
        let reraw = json!({"name": "t", "inputSchema": first.input_schema()});
        let second = normalize_tool("s", &reraw).unwrap();
        assert_eq!(first, second);
    }
}
