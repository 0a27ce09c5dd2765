//! Orchestrator use case.
//!
//! Drives one conversation between a user, an LLM adapter and the tool
//! servers behind the [`ToolRegistry`]:
//!
//! 1. Append the user's input
//! 2. Ask the adapter for its next step, with the full history and catalog
//! 3. Final text ends the run; proposed tool calls are resolved,
//!    validated, dispatched and their results appended, then back to 2
//!
//! Tool failures of any kind become error tool results the model can
//! react to. Only adapter exhaustion, the round limit and cancellation
//! end a run with an error.

use crate::config::ExecutionParams;
use crate::ports::conversation_logger::{
    ConversationEvent, ConversationLogger, NoConversationLogger,
};
use crate::ports::llm_adapter::{AdapterError, LlmAdapter};
use crate::ports::progress::{ConversationProgress, NoProgress};
use crate::services::tool_registry::{RegistryError, ResolvedTool, ToolRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wrp_domain::{
    AdapterReply, AdvertisedTool, Conversation, ToolCall, ToolFailure, ToolOutput, preview,
    validate_arguments,
};

/// Errors that end a run.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("LLM adapter failed: {0}")]
    Adapter(#[from] AdapterError),

    #[error("gave up after {limit} tool rounds without a final answer")]
    ToolRoundLimit { limit: usize },

    #[error("conversation cancelled")]
    Cancelled,
}

impl OrchestratorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OrchestratorError::Cancelled)
    }
}

/// One conversation with one (primary) LLM backend.
///
/// The registry is shared; the conversation is owned. Switching providers
/// means building a new orchestrator over the same registry, optionally
/// carrying the history across with [`with_conversation`](Self::with_conversation).
pub struct Orchestrator {
    adapters: Vec<Arc<dyn LlmAdapter>>,
    registry: Arc<ToolRegistry>,
    conversation: Conversation,
    params: ExecutionParams,
    conversation_logger: Arc<dyn ConversationLogger>,
    progress: Arc<dyn ConversationProgress>,
}

impl Orchestrator {
    pub fn new(adapter: Arc<dyn LlmAdapter>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            adapters: vec![adapter],
            registry,
            conversation: Conversation::new(),
            params: ExecutionParams::default(),
            conversation_logger: Arc::new(NoConversationLogger),
            progress: Arc::new(NoProgress),
        }
    }

    /// Add an adapter to try when every earlier one has failed.
    pub fn with_fallback(mut self, adapter: Arc<dyn LlmAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_params(mut self, params: ExecutionParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn with_conversation_logger(mut self, logger: Arc<dyn ConversationLogger>) -> Self {
        self.conversation_logger = logger;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ConversationProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn into_conversation(self) -> Conversation {
        self.conversation
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn primary_adapter(&self) -> &Arc<dyn LlmAdapter> {
        &self.adapters[0]
    }

    /// Run one user query to completion.
    pub async fn run(
        &mut self,
        user_input: &str,
        cancel: &CancellationToken,
    ) -> Result<String, OrchestratorError> {
        info!("Orchestrator: query: {}", preview(user_input, 100));
        self.conversation.push_user(user_input);
        self.conversation_logger.log(ConversationEvent::new(
            "user_input",
            serde_json::json!({ "text": user_input }),
        ));

        let mut rounds = 0usize;
        loop {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }

            let catalog = self.registry.catalog().await;
            debug!("Orchestrator: {} tools advertised", catalog.len());

            let reply = self.call_adapters(&catalog, rounds + 1, cancel).await?;

            match reply {
                AdapterReply::FinalText { text } => {
                    self.conversation.push_assistant(text.clone());
                    self.conversation_logger.log(ConversationEvent::new(
                        "final_answer",
                        serde_json::json!({ "bytes": text.len(), "text": text }),
                    ));
                    info!("Orchestrator: answered after {} tool rounds", rounds);
                    return Ok(text);
                }
                AdapterReply::ProposedToolCalls { text, calls } => {
                    rounds += 1;
                    if rounds > self.params.max_tool_rounds {
                        warn!(
                            "Orchestrator: exceeded max_tool_rounds ({})",
                            self.params.max_tool_rounds
                        );
                        return Err(OrchestratorError::ToolRoundLimit {
                            limit: self.params.max_tool_rounds,
                        });
                    }

                    self.conversation_logger.log(ConversationEvent::new(
                        "tool_calls",
                        serde_json::json!({
                            "round": rounds,
                            "calls": calls.iter().map(|c| serde_json::json!({
                                "id": c.id,
                                "name": c.name,
                                "arguments": c.arguments,
                            })).collect::<Vec<_>>(),
                        }),
                    ));
                    self.conversation.push_tool_calls(text, calls.clone());

                    let outputs = self.dispatch(&calls, cancel).await;
                    let cancelled = outputs.is_none();
                    let outputs = outputs.unwrap_or_else(|| {
                        calls
                            .iter()
                            .map(|_| {
                                ToolOutput::failure(
                                    ToolFailure::Cancelled,
                                    "cancelled before the tool returned",
                                )
                            })
                            .collect()
                    });

                    for (call, output) in calls.iter().zip(outputs) {
                        self.conversation_logger.log(ConversationEvent::new(
                            "tool_result",
                            serde_json::json!({
                                "call_id": call.id,
                                "tool": call.name,
                                "is_error": output.is_error(),
                                "failure": output.failure.map(|f| f.as_str()),
                                "bytes": output.content.len(),
                            }),
                        ));
                        self.conversation
                            .push_tool_result(call.id.clone(), call.name.clone(), output);
                    }

                    if cancelled {
                        return Err(OrchestratorError::Cancelled);
                    }
                }
            }
        }
    }

    /// Ask the adapter chain for the next reply, with timeout, retry and
    /// fallback.
    async fn call_adapters(
        &self,
        catalog: &[AdvertisedTool],
        round: usize,
        cancel: &CancellationToken,
    ) -> Result<AdapterReply, OrchestratorError> {
        let mut last_error: Option<AdapterError> = None;

        for (index, adapter) in self.adapters.iter().enumerate() {
            if index > 0 {
                let from = self.adapters[index - 1].kind();
                warn!("Orchestrator: falling back from {} to {}", from, adapter.kind());
                self.progress.on_adapter_fallback(from, adapter.kind());
            }

            for attempt in 0..=self.params.adapter_retries {
                self.progress
                    .on_adapter_start(adapter.kind(), adapter.model(), round);

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.progress.on_adapter_end();
                        return Err(OrchestratorError::Cancelled);
                    }
                    r = tokio::time::timeout(
                        self.params.adapter_timeout,
                        adapter.chat(&self.conversation, catalog),
                    ) => r,
                };
                self.progress.on_adapter_end();

                let error = match result {
                    Ok(Ok(reply)) => return Ok(reply),
                    Ok(Err(e)) => e,
                    Err(_) => AdapterError::timeout(adapter.kind(), self.params.adapter_timeout),
                };

                warn!(
                    provider = %adapter.kind(),
                    attempt = attempt + 1,
                    "Orchestrator: adapter call failed: {}",
                    error
                );

                let retry = error.is_retryable() && attempt < self.params.adapter_retries;
                if !retry {
                    last_error = Some(error);
                    break;
                }

                self.progress
                    .on_adapter_retry(adapter.kind(), attempt + 1, &error.to_string());
                let delay = error
                    .retry_after()
                    .unwrap_or_else(|| self.params.retry_delay(attempt));
                last_error = Some(error);

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        match last_error {
            Some(e) => Err(OrchestratorError::Adapter(e)),
            // The adapter list is never empty, so the loop above always
            // records an error before reaching here.
            None => Err(OrchestratorError::Cancelled),
        }
    }

    /// Resolve, validate and execute a batch of calls.
    ///
    /// Calls to different sessions run concurrently; calls to the same
    /// session run one after another in proposal order. The returned
    /// outputs are in proposal order. `None` means the batch was
    /// cancelled and every in-flight result was discarded.
    async fn dispatch(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Option<Vec<ToolOutput>> {
        let mut outputs: Vec<Option<ToolOutput>> = vec![None; calls.len()];
        let mut groups: BTreeMap<(String, u64), Vec<(usize, &ToolCall, ResolvedTool)>> =
            BTreeMap::new();

        for (index, call) in calls.iter().enumerate() {
            match self.registry.resolve(&call.name).await {
                Ok(resolved) => {
                    if let Err(e) = validate_arguments(&resolved.descriptor, &call.arguments) {
                        debug!(tool = %call.name, "Orchestrator: rejected arguments: {}", e);
                        outputs[index] =
                            Some(ToolOutput::failure(ToolFailure::InvalidArguments, e.to_string()));
                        continue;
                    }
                    let key = (
                        resolved.descriptor.server.clone(),
                        resolved.server.session_id(),
                    );
                    groups.entry(key).or_default().push((index, call, resolved));
                }
                Err(e) => {
                    let failure = match e {
                        RegistryError::Ambiguous { .. } => ToolFailure::Ambiguous,
                        _ => ToolFailure::NotFound,
                    };
                    debug!(tool = %call.name, "Orchestrator: cannot resolve: {}", e);
                    outputs[index] = Some(ToolOutput::failure(failure, e.to_string()));
                }
            }
        }

        let timeout = self.params.tool_call_timeout;
        let progress = &self.progress;
        let group_futures = groups.into_values().map(|group| async move {
            let mut results = Vec::with_capacity(group.len());
            for (index, call, resolved) in group {
                progress.on_tool_call(call, &resolved.descriptor.server);
                let output = match tokio::time::timeout(
                    timeout,
                    resolved
                        .server
                        .call_tool(&resolved.descriptor.name, &call.arguments, timeout),
                )
                .await
                {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => e.into_output(&resolved.descriptor.name),
                    Err(_) => ToolOutput::failure(
                        ToolFailure::Timeout,
                        format!(
                            "tools/call '{}' on server '{}' timed out after {}s",
                            resolved.descriptor.name,
                            resolved.descriptor.server,
                            timeout.as_secs_f64()
                        ),
                    ),
                };
                progress.on_tool_result(call, &output);
                results.push((index, output));
            }
            results
        });

        let finished = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Orchestrator: cancelled during tool dispatch, discarding in-flight results");
                return None;
            }
            r = futures::future::join_all(group_futures) => r,
        };

        for (index, output) in finished.into_iter().flatten() {
            outputs[index] = Some(output);
        }

        Some(
            outputs
                .into_iter()
                .map(|o| {
                    o.unwrap_or_else(|| {
                        ToolOutput::failure(ToolFailure::ServerError, "no result produced")
                    })
                })
                .collect(),
        )
    }
}
