//! Local models through Ollama's `/api/chat`.
//!
//! Tools are advertised in the system prompt and the model answers with
//! a plain-text protocol:
//!
//! ```text
//! TOOL: <tool_name>
//! ARGS: <json_args>
//! ```
//!
//! A reply whose `ARGS` line is not valid JSON is treated as plain text.

use super::http::{build_client, post_json};
use super::system_prompt;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value, json};
use std::fmt::Write;
use tracing::debug;
use wrp_application::ports::llm_adapter::{AdapterError, LlmAdapter};
use wrp_domain::{
    AdapterReply, AdvertisedTool, Conversation, ProviderConfig, ProviderKind, ProviderOptions, ToolCall, Turn,
};

const PROVIDER: ProviderKind = ProviderKind::Ollama;

pub struct OllamaAdapter {
    client: Client,
    endpoint: String,
    model: String,
    options: ProviderOptions,
}

impl OllamaAdapter {
    pub fn new(config: &ProviderConfig, host: &str) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(PROVIDER, config.options().request_timeout)?,
            endpoint: format!("{host}/api/chat"),
            model: config.model().to_string(),
            options: config.options().clone(),
        })
    }
}

#[async_trait]
impl LlmAdapter for OllamaAdapter {
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
        let response = post_json(PROVIDER, &self.client, &self.endpoint, HeaderMap::new(), &body).await?;
        parse_reply(&response, conversation.len())
    }
}

/// System prompt with the tool list and the reply protocol.
pub fn tool_prompt(base: &str, tools: &[AdvertisedTool]) -> String {
    let mut prompt = base.trim_end().to_string();
    if tools.is_empty() {
        return prompt;
    }
    prompt.push_str(
        "\n\nYou have access to the tools listed below.\n\
         When a tool is needed, reply with exactly these two lines and nothing else:\n\
         TOOL: <tool_name>\n\
         ARGS: <json_args>\n\
         To call several tools, repeat the pair once per call.\n\nTools:\n",
    );
    for tool in tools {
        let _ = writeln!(prompt, "- {}: {}", tool.name, tool.description());
        if tool.descriptor.parameters.is_empty() {
            continue;
        }
        prompt.push_str("  Parameters:\n");
        for param in &tool.descriptor.parameters {
            let required = if param.required { "required" } else { "optional" };
            let _ = writeln!(
                prompt,
                "    - {} ({}, {}): {}",
                param.name, param.param_type, required, param.description
            );
        }
    }
    prompt
}

fn render_call(call: &ToolCall) -> String {
    format!(
        "TOOL: {}\nARGS: {}",
        call.name,
        Value::Object(call.arguments.clone())
    )
}

pub fn build_request(
    model: &str,
    options: &ProviderOptions,
    conversation: &Conversation,
    tools: &[AdvertisedTool],
) -> Value {
    let system = tool_prompt(&system_prompt(conversation, options), tools);
    let mut messages = vec![json!({"role": "system", "content": system})];

    for turn in conversation.turns() {
        let message = match turn {
            Turn::User { text } => json!({"role": "user", "content": text}),
            Turn::Assistant { text } => json!({"role": "assistant", "content": text}),
            Turn::ToolCalls { text, calls } => {
                let mut content: Vec<String> = text.iter().cloned().collect();
                content.extend(calls.iter().map(render_call));
                json!({"role": "assistant", "content": content.join("\n")})
            }
            Turn::ToolResult(result) => json!({
                "role": "user",
                "content": format!("Result of tool {}: {}", result.tool_name, result.output),
            }),
        };
        messages.push(message);
    }

    let mut model_options = json!({"num_predict": options.max_tokens});
    if let Some(t) = options.temperature {
        model_options["temperature"] = json!(t);
    }
    json!({
        "model": model,
        "messages": messages,
        "stream": false,
        "options": model_options,
    })
}

/// Split a reply into leftover text and `TOOL:`/`ARGS:` calls.
///
/// Returns `None` when an `ARGS` line does not hold a JSON object.
fn parse_tool_protocol(content: &str, seed: usize) -> Option<(String, Vec<ToolCall>)> {
    let mut text = Vec::new();
    let mut calls: Vec<ToolCall> = Vec::new();
    let mut pending: Option<String> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix("TOOL:") {
            if let Some(previous) = pending.take() {
                calls.push(ToolCall::new(format!("ollama_{seed}_{}", calls.len()), previous));
            }
            pending = Some(name.trim().to_string());
        } else if let Some(raw) = trimmed.strip_prefix("ARGS:") {
            let name = pending.take()?;
            let args: Map<String, Value> = match serde_json::from_str(raw.trim()).ok()? {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                _ => return None,
            };
            calls.push(
                ToolCall::new(format!("ollama_{seed}_{}", calls.len()), name).with_arguments(args),
            );
        } else if !trimmed.is_empty() {
            text.push(line);
        }
    }
    if let Some(name) = pending {
        calls.push(ToolCall::new(format!("ollama_{seed}_{}", calls.len()), name));
    }
    calls.retain(|c| !c.name.is_empty());
    Some((text.join("\n"), calls))
}

pub fn parse_reply(response: &Value, seed: usize) -> Result<AdapterReply, AdapterError> {
    let content = response["message"]["content"]
        .as_str()
        .ok_or_else(|| AdapterError::malformed(PROVIDER, "response has no message.content"))?;

    if content.contains("TOOL:") {
        match parse_tool_protocol(content, seed) {
            Some((text, calls)) if !calls.is_empty() => {
                return Ok(AdapterReply::tool_calls(Some(text), calls));
            }
            _ => debug!(provider = %PROVIDER, "TOOL: marker without a usable call; treating as text"),
        }
    }
    Ok(AdapterReply::text(content.trim()))
}
