//! LLM adapter port
//!
//! Defines the provider-agnostic interface the orchestrator uses to talk
//! to an LLM backend. One implementation per [`ProviderKind`] lives in
//! the infrastructure layer.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use wrp_domain::{AdapterReply, AdvertisedTool, Conversation, ProviderKind};

/// Classification of an adapter failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterErrorKind {
    /// Credential missing, rejected or expired
    Authentication,
    /// Backend asked us to slow down
    RateLimited { retry_after: Option<Duration> },
    /// Backend answered with something we could not parse
    MalformedReply,
    /// No answer within the adapter timeout
    Timeout,
    /// Connection-level failure (DNS, TLS, reset)
    Transport,
    /// Backend returned a non-success HTTP status
    Backend { status: u16 },
    /// Adapter could not be built from its configuration
    Configuration,
}

impl std::fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterErrorKind::Authentication => write!(f, "authentication"),
            AdapterErrorKind::RateLimited { .. } => write!(f, "rate limited"),
            AdapterErrorKind::MalformedReply => write!(f, "malformed reply"),
            AdapterErrorKind::Timeout => write!(f, "timeout"),
            AdapterErrorKind::Transport => write!(f, "transport"),
            AdapterErrorKind::Backend { status } => write!(f, "backend status {status}"),
            AdapterErrorKind::Configuration => write!(f, "configuration"),
        }
    }
}

/// Error raised by an [`LlmAdapter`].
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{provider} adapter error ({kind}): {detail}")]
pub struct AdapterError {
    pub provider: ProviderKind,
    pub kind: AdapterErrorKind,
    pub detail: String,
}

impl AdapterError {
    pub fn new(provider: ProviderKind, kind: AdapterErrorKind, detail: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            detail: detail.into(),
        }
    }

    pub fn malformed(provider: ProviderKind, detail: impl Into<String>) -> Self {
        Self::new(provider, AdapterErrorKind::MalformedReply, detail)
    }

    pub fn timeout(provider: ProviderKind, after: Duration) -> Self {
        Self::new(
            provider,
            AdapterErrorKind::Timeout,
            format!("no reply within {}s", after.as_secs_f64()),
        )
    }

    /// Whether retrying the same backend may succeed.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            AdapterErrorKind::RateLimited { .. }
            | AdapterErrorKind::Timeout
            | AdapterErrorKind::Transport => true,
            AdapterErrorKind::Backend { status } => status >= 500,
            AdapterErrorKind::Authentication
            | AdapterErrorKind::MalformedReply
            | AdapterErrorKind::Configuration => false,
        }
    }

    /// Delay requested by the backend, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self.kind {
            AdapterErrorKind::RateLimited { retry_after } => retry_after,
            _ => None,
        }
    }
}

/// Port for one LLM backend.
///
/// `chat` receives the full conversation on every call; adapters keep no
/// conversational state of their own, so any adapter can pick up any
/// conversation.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Backend this adapter talks to
    fn kind(&self) -> ProviderKind;

    /// Model identifier sent to the backend
    fn model(&self) -> &str;

    /// Ask the model for its next step given the conversation so far.
    async fn chat(
        &self,
        conversation: &Conversation,
        tools: &[AdvertisedTool],
    ) -> Result<AdapterReply, AdapterError>;
}
