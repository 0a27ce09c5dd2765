//! LLM backends implementing [`LlmAdapter`].
//!
//! Each backend module exposes pure `build_request` / `parse_reply`
//! functions for its wire format; the adapter structs only add HTTP.
//! [`build_adapter`] is the single entry point that maps a
//! [`ProviderConfig`] to a ready adapter.

pub mod anthropic;
pub mod gemini;
mod http;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;
use wrp_application::ports::llm_adapter::{AdapterError, AdapterErrorKind, LlmAdapter};
use wrp_domain::{Conversation, ProviderConfig, ProviderKind, ProviderOptions};

/// Build the adapter for `config`, resolving credentials and host
/// overrides from the process environment.
pub fn build_adapter(config: &ProviderConfig) -> Result<Arc<dyn LlmAdapter>, AdapterError> {
    build_adapter_with(config, |name| std::env::var(name).ok())
}

/// [`build_adapter`] with an explicit environment lookup.
pub fn build_adapter_with(
    config: &ProviderConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn LlmAdapter>, AdapterError> {
    let kind = config.kind();
    let host = config.host(&lookup);
    let api_key = config
        .resolve_credential(&lookup)
        .map_err(|e| AdapterError::new(kind, AdapterErrorKind::Configuration, e.to_string()))?;

    let require_key = |key: Option<String>| {
        key.ok_or_else(|| {
            AdapterError::new(kind, AdapterErrorKind::Configuration, "no api key resolved")
        })
    };

    let adapter: Arc<dyn LlmAdapter> = match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiAdapter::new(config, &host, require_key(api_key)?)?),
        ProviderKind::Anthropic => {
            Arc::new(AnthropicAdapter::new(config, &host, require_key(api_key)?)?)
        }
        ProviderKind::Gemini => Arc::new(GeminiAdapter::new(config, &host, require_key(api_key)?)?),
        ProviderKind::Ollama => Arc::new(OllamaAdapter::new(config, &host)?),
    };
    info!(provider = %kind, model = config.model(), host = %host, "LLM adapter ready");
    Ok(adapter)
}

/// Conversation's own system prompt, else the configured one.
pub(crate) fn system_prompt(conversation: &Conversation, options: &ProviderOptions) -> String {
    conversation
        .system_prompt()
        .unwrap_or(&options.system_prompt)
        .to_string()
}

/// Tool call arguments as an object. Backends send either an object or
/// a JSON-encoded string; empty and null mean no arguments.
pub(crate) fn arguments_object(
    provider: ProviderKind,
    raw: Option<&Value>,
) -> Result<Map<String, Value>, AdapterError> {
    match raw {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Map::new()),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(AdapterError::malformed(
                provider,
                format!("tool arguments are not an object: {other}"),
            )),
            Err(e) => Err(AdapterError::malformed(
                provider,
                format!("tool arguments are not valid JSON ({e}): {s}"),
            )),
        },
        Some(other) => Err(AdapterError::malformed(
            provider,
            format!("tool arguments are not an object: {other}"),
        )),
    }
}
