//! OpenAI chat completions backend.

use super::http::{build_client, post_json};
use super::{arguments_object, system_prompt};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::debug;
use wrp_application::ports::llm_adapter::{AdapterError, AdapterErrorKind, LlmAdapter};
use wrp_domain::{
    AdapterReply, AdvertisedTool, Conversation, ProviderConfig, ProviderKind, ProviderOptions, ToolCall, Turn,
};

const PROVIDER: ProviderKind = ProviderKind::OpenAi;

pub struct OpenAiAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    options: ProviderOptions,
}

impl OpenAiAdapter {
    pub fn new(config: &ProviderConfig, host: &str, api_key: String) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(PROVIDER, config.options().request_timeout)?,
            endpoint: format!("{host}/chat/completions"),
            api_key,
            model: config.model().to_string(),
            options: config.options().clone(),
        })
    }

    fn headers(&self) -> Result<HeaderMap, AdapterError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|_| {
            AdapterError::new(
                PROVIDER,
                AdapterErrorKind::Configuration,
                "api key contains characters not allowed in a header",
            )
        })?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }
}

#[async_trait]
impl LlmAdapter for OpenAiAdapter {
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

/// Translate the conversation into a chat completions request body.
pub fn build_request(
    model: &str,
    options: &ProviderOptions,
    conversation: &Conversation,
    tools: &[AdvertisedTool],
) -> Value {
    let mut messages = vec![json!({"role": "system", "content": system_prompt(conversation, options)})];

    for turn in conversation.turns() {
        match turn {
            Turn::User { text } => messages.push(json!({"role": "user", "content": text})),
            Turn::Assistant { text } => messages.push(json!({"role": "assistant", "content": text})),
            Turn::ToolCalls { text, calls } => {
                let tool_calls: Vec<Value> = calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": Value::Object(call.arguments.clone()).to_string(),
                            }
                        })
                    })
                    .collect();
                messages.push(json!({
                    "role": "assistant",
                    "content": text,
                    "tool_calls": tool_calls,
                }));
            }
            Turn::ToolResult(result) => messages.push(json!({
                "role": "tool",
                "tool_call_id": result.call_id,
                "content": result.output.to_string(),
            })),
        }
    }

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": options.max_tokens,
    });
    if let Some(t) = options.temperature {
        body["temperature"] = json!(t);
    }
    if !tools.is_empty() {
        body["tools"] = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description(),
                        "parameters": t.input_schema(),
                    }
                })
            })
            .collect();
    }
    body
}

/// Extract text and tool calls from `choices[0].message`.
pub fn parse_reply(response: &Value) -> Result<AdapterReply, AdapterError> {
    let message = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| AdapterError::malformed(PROVIDER, "response has no choices[0].message"))?;

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut calls = Vec::new();
    if let Some(raw_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for (index, raw) in raw_calls.iter().enumerate() {
            let function = raw
                .get("function")
                .ok_or_else(|| AdapterError::malformed(PROVIDER, "tool call without function"))?;
            let name = function
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| AdapterError::malformed(PROVIDER, "tool call without name"))?;
            let id = raw
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("call_{index}"));
            let arguments = arguments_object(PROVIDER, function.get("arguments"))?;
            calls.push(ToolCall::new(id, name).with_arguments(arguments));
        }
    }

    debug!(
        provider = %PROVIDER,
        tool_calls = calls.len(),
        finish_reason = response["choices"][0]["finish_reason"].as_str().unwrap_or(""),
        "LLM reply parsed"
    );
    Ok(AdapterReply::tool_calls(text, calls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wrp_domain::{ToolDescriptor, ToolFailure, ToolOutput};

    fn conversation() -> Conversation {
        let mut c = Conversation::new();
        c.push_user("ping 3");
        c.push_tool_calls(None, vec![ToolCall::new("call_1", "ping").with_arg("x", 3)]);
        c.push_tool_result("call_1", "ping", ToolOutput::success("3"));
        c.push_tool_calls(None, vec![ToolCall::new("call_2", "ping")]);
        c.push_tool_result(
            "call_2",
            "ping",
            ToolOutput::failure(ToolFailure::InvalidArguments, "missing required argument 'x'"),
        );
        c
    }

    #[test]
    fn test_build_request_messages() {
        let options = ProviderOptions {
            temperature: Some(0.5),
            ..Default::default()
        };
        let body = build_request("gpt-4-turbo", &options, &conversation(), &[]);

        assert_eq!(body["model"], "gpt-4-turbo");
        assert_eq!(body["temperature"], json!(0.5f32));
        assert!(body.get("tools").is_none());

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1], json!({"role": "user", "content": "ping 3"}));
        assert_eq!(messages[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"], "{\"x\":3}");
        assert_eq!(
            messages[3],
            json!({"role": "tool", "tool_call_id": "call_1", "content": "3"})
        );
        assert_eq!(
            messages[5]["content"],
            "[invalid_arguments] missing required argument 'x'"
        );
    }

    #[test]
    fn test_build_request_tools() {
        let tool = AdvertisedTool::new("Echo__ping", ToolDescriptor::new("Echo", "ping", "Echo x back"));
        let body = build_request("m", &ProviderOptions::default(), &Conversation::new(), &[tool]);
        let function = &body["tools"][0]["function"];
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(function["name"], "Echo__ping");
        assert_eq!(function["description"], "Echo x back");
        assert_eq!(function["parameters"]["type"], "object");
    }

    #[test]
    fn test_parse_text_reply() {
        let response = json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}]
        });
        assert_eq!(parse_reply(&response).unwrap(), AdapterReply::text("hello"));
    }

    #[test]
    fn test_parse_tool_calls() {
        let response = json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {"id": "call_a", "type": "function", "function": {"name": "ping", "arguments": "{\"x\": 3}"}},
                    {"id": "call_b", "type": "function", "function": {"name": "status", "arguments": ""}}
                ]
            }}]
        });
        match parse_reply(&response).unwrap() {
            AdapterReply::ProposedToolCalls { text, calls } => {
                assert_eq!(text, None);
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].id, "call_a");
                assert_eq!(calls[0].arguments["x"], 3);
                assert!(calls[1].arguments.is_empty());
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_parse_malformed() {
        let err = parse_reply(&json!({"error": "nope"})).unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::MalformedReply);

        let bad_args = json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "c", "function": {"name": "ping", "arguments": "{not json"}}
            ]}}]
        });
        assert_eq!(parse_reply(&bad_args).unwrap_err().kind, AdapterErrorKind::MalformedReply);
    }
}
