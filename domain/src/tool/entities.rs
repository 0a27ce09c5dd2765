//! Tool domain entities

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Separator between server and tool in a qualified tool name
/// (e.g. `jarvis__build_pipeline`).
pub const QUALIFIED_SEPARATOR: &str = "__";

/// Longest function name OpenAI and Gemini accept.
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// Build the qualified `<server>__<tool>` form of a tool name.
///
/// The result only contains `[A-Za-z0-9_-]` (anything else becomes `_`)
/// and is cut to [`MAX_TOOL_NAME_LEN`], so it is a valid function name
/// for every backend. It is not reversible; the registry maps it back by
/// comparing against the qualified names it advertised.
pub fn qualify(server: &str, tool: &str) -> String {
    format!("{server}{QUALIFIED_SEPARATOR}{tool}")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TOOL_NAME_LEN)
        .collect()
}

/// Primitive type of a tool parameter after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// Map a JSON Schema `type` keyword to a parameter type.
    ///
    /// Returns `None` for `"null"` and unknown keywords.
    pub fn from_schema_type(s: &str) -> Option<Self> {
        match s {
            "string" => Some(ParamType::String),
            "integer" | "int" => Some(ParamType::Integer),
            "number" | "float" | "double" => Some(ParamType::Number),
            "boolean" | "bool" => Some(ParamType::Boolean),
            "array" | "list" => Some(ParamType::Array),
            "object" | "dict" => Some(ParamType::Object),
            _ => None,
        }
    }

    /// Infer the type of a concrete JSON value.
    pub fn of_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(ParamType::String),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(ParamType::Integer),
            Value::Number(_) => Some(ParamType::Number),
            Value::Bool(_) => Some(ParamType::Boolean),
            Value::Array(_) => Some(ParamType::Array),
            Value::Object(_) => Some(ParamType::Object),
            Value::Null => None,
        }
    }

    /// Whether `value` is acceptable for a parameter of this type.
    ///
    /// Integers are accepted where numbers are expected, and floats with no
    /// fractional part are accepted as integers.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => match value {
                Value::Number(n) => {
                    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
                }
                _ => false,
            },
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single parameter of a tool, normalized from whatever schema dialect
/// the server used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name
    pub name: String,
    /// Human-readable description (empty when the server gave none)
    pub description: String,
    /// Normalized primitive type
    pub param_type: ParamType,
    /// Whether the parameter must be present
    pub required: bool,
    /// Allowed values, if the schema restricts them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    /// Element type for arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<ParamType>,
    /// Resolved sub-schema with `$ref`s inlined and null branches removed
    pub schema: Value,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        let param_type_str = param_type.as_str();
        Self {
            name: name.into(),
            description: String::new(),
            param_type,
            required: false,
            enum_values: Vec::new(),
            items: None,
            schema: serde_json::json!({ "type": param_type_str }),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if let Some(obj) = self.schema.as_object_mut() {
            obj.insert("description".into(), Value::String(description.clone()));
        }
        self.description = description;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A tool offered by one MCP server, in normalized form.
///
/// `name` is unique within `server`; the pair is unique across the
/// gateway and is what [`qualified_name`](Self::qualified_name) encodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Server that owns the tool
    pub server: String,
    /// Tool name as the server knows it
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Normalized parameters, in schema order
    pub parameters: Vec<ToolParameter>,
}

impl ToolDescriptor {
    pub fn new(
        server: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn qualified_name(&self) -> String {
        qualify(&self.server, &self.name)
    }

    pub fn parameter(&self, name: &str) -> Option<&ToolParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &ToolParameter> {
        self.parameters.iter().filter(|p| p.required)
    }

    /// Canonical JSON Schema (`type: object`) for this tool's input.
    ///
    /// Every backend that accepts full JSON Schema receives this shape,
    /// regardless of the dialect the server originally used.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            properties.insert(param.name.clone(), param.schema.clone());
        }
        let required: Vec<Value> = self
            .required_parameters()
            .map(|p| Value::String(p.name.clone()))
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A tool as presented to the LLM: the descriptor plus the name the model
/// must use to call it (bare when unique, qualified on collision).
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertisedTool {
    pub name: String,
    pub descriptor: ToolDescriptor,
}

impl AdvertisedTool {
    pub fn new(name: impl Into<String>, descriptor: ToolDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
        }
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn input_schema(&self) -> Value {
        self.descriptor.input_schema()
    }

    pub fn is_qualified(&self) -> bool {
        self.name != self.descriptor.name
    }
}

/// A function call proposed by the LLM.
///
/// `id` is the backend-assigned correlation id (synthesized for backends
/// that do not assign one) and is echoed back on the matching tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id for the tool result
    pub id: String,
    /// Tool name as advertised to the LLM (qualified or not)
    pub name: String,
    /// Arguments object
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: Map::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("jarvis", "build_pipeline"), "jarvis__build_pipeline");
        assert_eq!(qualify("slurm", "submit__job"), "slurm__submit__job");
    }

    #[test]
    fn test_qualify_sanitizes_server_names() {
        assert_eq!(qualify("Jarvis MCP", "status"), "Jarvis_MCP__status");
        assert_eq!(qualify("fs.local", "read-file"), "fs_local__read-file");
        assert_eq!(qualify("Météo", "now"), "M_t_o__now");
    }

    #[test]
    fn test_qualify_truncates() {
        let long = "x".repeat(80);
        let name = qualify("srv", &long);
        assert_eq!(name.len(), MAX_TOOL_NAME_LEN);
        assert!(name.starts_with("srv__x"));
    }

    #[test]
    fn test_param_type_accepts() {
        assert!(ParamType::Integer.accepts(&json!(3)));
        assert!(ParamType::Integer.accepts(&json!(3.0)));
        assert!(!ParamType::Integer.accepts(&json!(3.5)));
        assert!(ParamType::Number.accepts(&json!(3)));
        assert!(!ParamType::String.accepts(&json!(3)));
        assert!(ParamType::Object.accepts(&json!({})));
    }

    #[test]
    fn test_input_schema_shape() {
        let tool = ToolDescriptor::new("fs", "read", "Read a file")
            .with_parameter(
                ToolParameter::new("path", ParamType::String)
                    .with_description("File path")
                    .required(),
            )
            .with_parameter(ToolParameter::new("limit", ParamType::Integer));

        let schema = tool.input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["path"]["type"], "string");
        assert_eq!(schema["properties"]["path"]["description"], "File path");
        assert_eq!(schema["required"], json!(["path"]));
        assert_eq!(tool.qualified_name(), "fs__read");
    }

    #[test]
    fn test_tool_call_builder() {
        let call = ToolCall::new("call_1", "read").with_arg("path", "/tmp/x");
        assert_eq!(call.get_string("path"), Some("/tmp/x"));
        assert_eq!(call.get_string("missing"), None);
    }
}
