//! Anthropic messages API backend.

use super::http::{build_client, post_json};
use super::system_prompt;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Map, Value, json};
use wrp_application::ports::llm_adapter::{AdapterError, AdapterErrorKind, LlmAdapter};
use wrp_domain::{
    AdapterReply, AdvertisedTool, Conversation, ProviderConfig, ProviderKind, ProviderOptions, ToolCall, Turn,
};

const PROVIDER: ProviderKind = ProviderKind::Anthropic;
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    options: ProviderOptions,
}

impl AnthropicAdapter {
    pub fn new(config: &ProviderConfig, host: &str, api_key: String) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(PROVIDER, config.options().request_timeout)?,
            endpoint: format!("{host}/v1/messages"),
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
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }
}

#[async_trait]
impl LlmAdapter for AnthropicAdapter {
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
        let body = build_request(&self.model, &self.options, conversation, tools);
        let response = post_json(PROVIDER, &self.client, &self.endpoint, self.headers()?, &body).await?;
        parse_reply(&response)
    }
}

/// Append `blocks` under `role`, merging with the previous message when
/// it has the same role. The API rejects two consecutive user messages.
fn push_blocks(messages: &mut Vec<Value>, role: &str, mut blocks: Vec<Value>) {
    if let Some(last) = messages.last_mut()
        && last["role"] == role
        && let Some(content) = last["content"].as_array_mut()
    {
        content.append(&mut blocks);
        return;
    }
    messages.push(json!({"role": role, "content": blocks}));
}

pub fn build_request(
    model: &str,
    options: &ProviderOptions,
    conversation: &Conversation,
    tools: &[AdvertisedTool],
) -> Value {
    let mut messages: Vec<Value> = Vec::new();

    for turn in conversation.turns() {
        match turn {
            Turn::User { text } => {
                push_blocks(&mut messages, "user", vec![json!({"type": "text", "text": text})])
            }
            Turn::Assistant { text } => {
                push_blocks(&mut messages, "assistant", vec![json!({"type": "text", "text": text})])
            }
            Turn::ToolCalls { text, calls } => {
                let mut blocks = Vec::with_capacity(calls.len() + 1);
                if let Some(text) = text {
                    blocks.push(json!({"type": "text", "text": text}));
                }
                blocks.extend(calls.iter().map(|call| {
                    json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    })
                }));
                push_blocks(&mut messages, "assistant", blocks);
            }
            Turn::ToolResult(result) => push_blocks(
                &mut messages,
                "user",
                vec![json!({
                    "type": "tool_result",
                    "tool_use_id": result.call_id,
                    "content": result.output.to_string(),
                    "is_error": result.output.is_error(),
                })],
            ),
        }
    }

    let mut body = json!({
        "model": model,
        "max_tokens": options.max_tokens,
        "system": system_prompt(conversation, options),
        "messages": messages,
    });
    if let Some(t) = options.temperature {
        body["temperature"] = json!(t);
    }
    if !tools.is_empty() {
        body["tools"] = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description(),
                    "input_schema": t.input_schema(),
                })
            })
            .collect();
    }
    body
}

pub fn parse_reply(response: &Value) -> Result<AdapterReply, AdapterError> {
    let content = response
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| AdapterError::malformed(PROVIDER, "response has no content array"))?;

    let mut text = String::new();
    let mut calls = Vec::new();
    for block in content {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => text.push_str(block["text"].as_str().unwrap_or_default()),
            Some("tool_use") => {
                let id = block["id"]
                    .as_str()
                    .ok_or_else(|| AdapterError::malformed(PROVIDER, "tool_use block without id"))?;
                let name = block["name"]
                    .as_str()
                    .ok_or_else(|| AdapterError::malformed(PROVIDER, "tool_use block without name"))?;
                let input = match block.get("input") {
                    Some(Value::Object(map)) => map.clone(),
                    None | Some(Value::Null) => Map::new(),
                    Some(other) => {
                        return Err(AdapterError::malformed(
                            PROVIDER,
                            format!("tool_use input is not an object: {other}"),
                        ));
                    }
                };
                calls.push(ToolCall::new(id, name).with_arguments(input));
            }
            _ => {}
        }
    }

    let text = text.trim().to_string();
    if calls.is_empty() {
        return Ok(AdapterReply::text(text));
    }
    Ok(AdapterReply::tool_calls(Some(text), calls))
}
