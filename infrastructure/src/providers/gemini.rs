//! Google Gemini `generateContent` backend.
//!
//! Gemini accepts only an OpenAPI subset of JSON Schema for function
//! declarations, so tools are sent with a reduced schema built from the
//! normalized parameters rather than the full `input_schema`. Gemini also
//! assigns no call ids; they are synthesized from the conversation length
//! so that they stay unique across rounds.

use super::http::{build_client, post_json};
use super::{arguments_object, system_prompt};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Map, Value, json};
use wrp_application::ports::llm_adapter::{AdapterError, AdapterErrorKind, LlmAdapter};
use wrp_domain::{
    AdapterReply, AdvertisedTool, Conversation, ParamType, ProviderConfig, ProviderKind, ProviderOptions,
    ToolCall, ToolDescriptor, Turn,
};

const PROVIDER: ProviderKind = ProviderKind::Gemini;

pub struct GeminiAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    options: ProviderOptions,
}

impl GeminiAdapter {
    pub fn new(config: &ProviderConfig, host: &str, api_key: String) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(PROVIDER, config.options().request_timeout)?,
            endpoint: format!("{host}/models/{}:generateContent", config.model()),
            api_key,
            model: config.model().to_string(),
            options: config.options().clone(),
        })
    }

    fn headers(&self) -> Result<HeaderMap, AdapterError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key).map_err(|_| {
            AdapterError::new(
                PROVIDER,
                AdapterErrorKind::Configuration,
                "api key contains characters not allowed in a header",
            )
        })?;
        headers.insert("x-goog-api-key", key);
        Ok(headers)
    }
}

#[async_trait]
impl LlmAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        conversation: &Conversation,
        tools: &[AdvertisedTool],
    ) -> Result<AdapterReply, AdapterError> {
        let body = build_request(&self.options, conversation, tools);
        let response = post_json(PROVIDER, &self.client, &self.endpoint, self.headers()?, &body).await?;
        parse_reply(&response, conversation.len())
    }
}

fn gemini_type(t: ParamType) -> &'static str {
    match t {
        ParamType::String => "STRING",
        ParamType::Integer => "INTEGER",
        ParamType::Number => "NUMBER",
        ParamType::Boolean => "BOOLEAN",
        ParamType::Array => "ARRAY",
        ParamType::Object => "OBJECT",
    }
}

/// Function declaration `parameters` in Gemini's schema subset: type,
/// description, array items and enums only.
pub fn reduced_schema(descriptor: &ToolDescriptor) -> Value {
    let mut properties = Map::new();
    for param in &descriptor.parameters {
        let mut prop = json!({"type": gemini_type(param.param_type)});
        if !param.description.is_empty() {
            prop["description"] = json!(param.description);
        }
        if param.param_type == ParamType::Array {
            let items = param.items.unwrap_or(ParamType::String);
            prop["items"] = json!({"type": gemini_type(items)});
        }
        let enums: Vec<&str> = param.enum_values.iter().filter_map(Value::as_str).collect();
        if !enums.is_empty() && param.param_type == ParamType::String {
            prop["enum"] = json!(enums);
        }
        properties.insert(param.name.clone(), prop);
    }
    let required: Vec<&str> = descriptor
        .required_parameters()
        .map(|p| p.name.as_str())
        .collect();

    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": required,
    })
}

fn push_parts(contents: &mut Vec<Value>, role: &str, mut parts: Vec<Value>) {
    if let Some(last) = contents.last_mut()
        && last["role"] == role
        && let Some(existing) = last["parts"].as_array_mut()
    {
        existing.append(&mut parts);
        return;
    }
    contents.push(json!({"role": role, "parts": parts}));
}

pub fn build_request(options: &ProviderOptions, conversation: &Conversation, tools: &[AdvertisedTool]) -> Value {
    let mut contents: Vec<Value> = Vec::new();

    for turn in conversation.turns() {
        match turn {
            Turn::User { text } => push_parts(&mut contents, "user", vec![json!({"text": text})]),
            Turn::Assistant { text } => push_parts(&mut contents, "model", vec![json!({"text": text})]),
            Turn::ToolCalls { text, calls } => {
                let mut parts = Vec::with_capacity(calls.len() + 1);
                if let Some(text) = text {
                    parts.push(json!({"text": text}));
                }
                parts.extend(
                    calls
                        .iter()
                        .map(|call| json!({"functionCall": {"name": call.name, "args": call.arguments}})),
                );
                push_parts(&mut contents, "model", parts);
            }
            Turn::ToolResult(result) => {
                let response = if result.output.is_error() {
                    json!({"error": result.output.to_string()})
                } else {
                    json!({"result": result.output.content})
                };
                push_parts(
                    &mut contents,
                    "user",
                    vec![json!({"functionResponse": {"name": result.tool_name, "response": response}})],
                );
            }
        }
    }

    let mut generation = json!({"maxOutputTokens": options.max_tokens});
    if let Some(t) = options.temperature {
        generation["temperature"] = json!(t);
    }

    let mut body = json!({
        "systemInstruction": {"parts": [{"text": system_prompt(conversation, options)}]},
        "contents": contents,
        "generationConfig": generation,
    });
    if !tools.is_empty() {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description(),
                    "parameters": reduced_schema(&t.descriptor),
                })
            })
            .collect();
        body["tools"] = json!([{"functionDeclarations": declarations}]);
    }
    body
}

/// Parse the first candidate. `seed` keeps synthesized call ids unique.
pub fn parse_reply(response: &Value, seed: usize) -> Result<AdapterReply, AdapterError> {
    let Some(candidate) = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    else {
        let reason = response["promptFeedback"]["blockReason"]
            .as_str()
            .unwrap_or("no candidates");
        return Err(AdapterError::malformed(
            PROVIDER,
            format!("no candidates in response ({reason})"),
        ));
    };

    let Some(parts) = candidate["content"]["parts"].as_array() else {
        let finish = candidate["finishReason"].as_str().unwrap_or("unknown");
        return Err(AdapterError::malformed(
            PROVIDER,
            format!("candidate has no content (finishReason {finish})"),
        ));
    };

    let mut texts = Vec::new();
    let mut calls = Vec::new();
    for part in parts {
        if let Some(fc) = part.get("functionCall") {
            let name = fc["name"]
                .as_str()
                .ok_or_else(|| AdapterError::malformed(PROVIDER, "functionCall without name"))?;
            let id = fc["id"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("gemini_{seed}_{}", calls.len()));
            let args = arguments_object(PROVIDER, fc.get("args"))?;
            calls.push(ToolCall::new(id, name).with_arguments(args));
        } else if let Some(text) = part.get("text").and_then(Value::as_str) {
            texts.push(text);
        }
    }

    let text = texts.join("\n").trim().to_string();
    if calls.is_empty() {
        return Ok(AdapterReply::text(text));
    }
    Ok(AdapterReply::tool_calls(Some(text), calls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wrp_domain::{ToolFailure, ToolOutput, ToolParameter};

    fn descriptor() -> ToolDescriptor {
        let mut mode = ToolParameter::new("mode", ParamType::String).with_description("Run mode");
        mode.enum_values = vec![json!("fast"), json!("full")];
        let mut files = ToolParameter::new("files", ParamType::Array).required();
        files.items = Some(ParamType::String);

        ToolDescriptor::new("Jarvis", "build", "Build a pipeline")
            .with_parameter(mode)
            .with_parameter(files)
            .with_parameter(ToolParameter::new("retries", ParamType::Integer))
    }

    #[test]
    fn test_reduced_schema() {
        let schema = reduced_schema(&descriptor());
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["required"], json!(["files"]));
        assert_eq!(
            schema["properties"]["mode"],
            json!({"type": "STRING", "description": "Run mode", "enum": ["fast", "full"]})
        );
        assert_eq!(schema["properties"]["files"]["items"], json!({"type": "STRING"}));
        assert_eq!(schema["properties"]["retries"], json!({"type": "INTEGER"}));
    }

    #[test]
    fn test_build_request_contents() {
        let mut c = Conversation::new();
        c.push_user("build it");
        c.push_tool_calls(None, vec![ToolCall::new("gemini_1_0", "build").with_arg("files", json!(["a"]))]);
        c.push_tool_result(
            "gemini_1_0",
            "build",
            ToolOutput::failure(ToolFailure::ServerError, "disk full"),
        );

        let tools = vec![AdvertisedTool::new("build", descriptor())];
        let options = ProviderOptions {
            temperature: Some(0.25),
            ..Default::default()
        };
        let body = build_request(&options, &c, &tools);

        assert_eq!(body["generationConfig"]["temperature"], json!(0.25));
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["functionCall"]["name"], "build");
        assert_eq!(
            body["contents"][2]["parts"][0]["functionResponse"]["response"]["error"],
            "[server_error] disk full"
        );
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["parameters"]["type"],
            "OBJECT"
        );
    }

    #[test]
    fn test_parse_function_calls_synthesize_ids() {
        let response = json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"functionCall": {"name": "ping", "args": {"x": 1}}},
                {"functionCall": {"name": "ping", "args": {"x": 2}}}
            ]}}]
        });
        match parse_reply(&response, 4).unwrap() {
            AdapterReply::ProposedToolCalls { calls, .. } => {
                assert_eq!(calls[0].id, "gemini_4_0");
                assert_eq!(calls[1].id, "gemini_4_1");
                assert_eq!(calls[1].arguments["x"], 2);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_parse_text() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "first"}, {"text": "second"}]}}]
        });
        assert_eq!(parse_reply(&response, 0).unwrap(), AdapterReply::text("first\nsecond"));
    }

    #[test]
    fn test_blocked_prompt_is_malformed() {
        let response = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = parse_reply(&response, 0).unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::MalformedReply);
        assert!(err.detail.contains("SAFETY"));
    }
}
