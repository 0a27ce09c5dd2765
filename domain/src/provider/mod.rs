//! Provider configuration types (serde-free).
//!
//! A [`ProviderConfig`] names one LLM backend and everything needed to
//! talk to it. It is immutable once built: switching backends means
//! building a new config and a new adapter, never mutating a live one.

use crate::core::error::DomainError;
use std::str::FromStr;
use std::time::Duration;

/// Closed set of supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    Ollama,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
        ProviderKind::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4-turbo",
            ProviderKind::Anthropic => "claude-3-haiku-20240307",
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::Ollama => "llama2",
        }
    }

    pub fn default_host(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Ollama => "http://localhost:11434",
        }
    }

    /// Environment variable consulted when no credential is configured.
    pub fn credential_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Gemini => Some("GEMINI_API_KEY"),
            ProviderKind::Ollama => None,
        }
    }

    /// Environment variable that overrides the default host.
    pub fn host_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Ollama => Some("OLLAMA_HOST"),
            _ => None,
        }
    }

    pub fn requires_credential(&self) -> bool {
        self.credential_env().is_some()
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "gpt" => Ok(ProviderKind::OpenAi),
            "claude" | "anthropic" => Ok(ProviderKind::Anthropic),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(DomainError::UnknownProvider(other.to_string())),
        }
    }
}

/// Where an API key comes from.
///
/// Values written as `$NAME` in configuration refer to environment
/// variables and are resolved when the adapter is built.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Literal(String),
    Env(String),
}

impl Credential {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('$') {
            Some(var) => Credential::Env(var.trim_matches(|c| c == '{' || c == '}').to_string()),
            None => Credential::Literal(raw.to_string()),
        }
    }

    /// Resolve to the secret using `lookup` for environment references.
    pub fn resolve(
        &self,
        provider: ProviderKind,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String, DomainError> {
        match self {
            Credential::Literal(s) if !s.is_empty() => Ok(s.clone()),
            Credential::Literal(_) => Err(DomainError::MissingCredential {
                provider: provider.to_string(),
                source_hint: "empty api_key".to_string(),
            }),
            Credential::Env(var) => lookup(var).filter(|v| !v.is_empty()).ok_or_else(|| {
                DomainError::MissingCredential {
                    provider: provider.to_string(),
                    source_hint: format!("environment variable {var} is not set"),
                }
            }),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Literal(_) => write!(f, "Literal(<redacted>)"),
            Credential::Env(var) => write!(f, "Env(${var})"),
        }
    }
}

/// Tunables shared by every backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOptions {
    /// Base URL override (otherwise [`ProviderKind::default_host`])
    pub host: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    /// Timeout for one HTTP request to the backend
    pub request_timeout: Duration,
    pub system_prompt: String,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            host: None,
            temperature: None,
            max_tokens: 2048,
            request_timeout: Duration::from_secs(120),
            system_prompt: "You are a helpful assistant.".to_string(),
        }
    }
}

/// Immutable description of one LLM backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    kind: ProviderKind,
    model: String,
    credential: Option<Credential>,
    options: ProviderOptions,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            model: kind.default_model().to_string(),
            credential: kind.credential_env().map(|v| Credential::Env(v.to_string())),
            options: ProviderOptions::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_options(mut self, options: ProviderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    /// Effective base URL: explicit option, then the kind's host variable,
    /// then the built-in default.
    pub fn host(&self, lookup: impl Fn(&str) -> Option<String>) -> String {
        self.options
            .host
            .clone()
            .or_else(|| self.kind.host_env().and_then(&lookup))
            .unwrap_or_else(|| self.kind.default_host().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Resolve the API key, or `None` for backends that need none.
    pub fn resolve_credential(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<String>, DomainError> {
        match (&self.credential, self.kind.requires_credential()) {
            (Some(c), _) => c.resolve(self.kind, lookup).map(Some),
            (None, false) => Ok(None),
            (None, true) => Err(DomainError::MissingCredential {
                provider: self.kind.to_string(),
                source_hint: "no api_key configured".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |k| {
            pairs
                .iter()
                .find(|(name, _)| *name == k)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_provider_kind_aliases() {
        assert_eq!("claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("Anthropic".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!("ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert!(matches!(
            "mistral".parse::<ProviderKind>(),
            Err(DomainError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_defaults_per_kind() {
        let cfg = ProviderConfig::new(ProviderKind::Gemini);
        assert_eq!(cfg.model(), "gemini-1.5-flash");
        assert_eq!(cfg.credential(), Some(&Credential::Env("GEMINI_API_KEY".into())));
        assert!(ProviderConfig::new(ProviderKind::Ollama).credential().is_none());
    }

    #[test]
    fn test_credential_parse() {
        assert_eq!(Credential::parse("$OPENAI_API_KEY"), Credential::Env("OPENAI_API_KEY".into()));
        assert_eq!(Credential::parse("${KEY}"), Credential::Env("KEY".into()));
        assert_eq!(Credential::parse("sk-123"), Credential::Literal("sk-123".into()));
    }

    #[test]
    fn test_credential_debug_redacts_literal() {
        let debug = format!("{:?}", Credential::Literal("sk-secret".into()));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_resolve_credential_from_env() {
        let cfg = ProviderConfig::new(ProviderKind::OpenAi)
            .with_credential(Credential::parse("$MY_KEY"));
        let key = cfg.resolve_credential(env(&[("MY_KEY", "sk-1")])).unwrap();
        assert_eq!(key.as_deref(), Some("sk-1"));
    }

    #[test]
    fn test_resolve_credential_missing_env() {
        let cfg = ProviderConfig::new(ProviderKind::Anthropic);
        let err = cfg.resolve_credential(env(&[])).unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_ollama_needs_no_credential() {
        let cfg = ProviderConfig::new(ProviderKind::Ollama);
        assert_eq!(cfg.resolve_credential(env(&[])).unwrap(), None);
    }

    #[test]
    fn test_host_resolution_order() {
        let cfg = ProviderConfig::new(ProviderKind::Ollama);
        assert_eq!(cfg.host(env(&[])), "http://localhost:11434");
        assert_eq!(
            cfg.host(env(&[("OLLAMA_HOST", "http://gpu-box:11434/")])),
            "http://gpu-box:11434"
        );

        let explicit = cfg.with_options(ProviderOptions {
            host: Some("http://explicit:1".into()),
            ..ProviderOptions::default()
        });
        assert_eq!(
            explicit.host(env(&[("OLLAMA_HOST", "http://gpu-box:11434")])),
            "http://explicit:1"
        );
    }

    #[test]
    fn test_blank_model_keeps_default() {
        let cfg = ProviderConfig::new(ProviderKind::OpenAi).with_model("  ");
        assert_eq!(cfg.model(), "gpt-4-turbo");
    }
}
