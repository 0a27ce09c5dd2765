//! Validated runtime settings built from a [`FileConfig`].

use super::file_config::{ConfigValidationError, FileConfig, FileLlmConfig};
use crate::mcp::resolver::{ServerResolver, ServerSpec};
use crate::mcp::session::SessionOptions;
use crate::mcp::supervisor::SupervisorOptions;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use wrp_application::ExecutionParams;
use wrp_domain::{Credential, ProviderConfig, ProviderKind, ProviderOptions};

/// Everything the gateway needs to start, with every value checked.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub provider: ProviderConfig,
    pub fallbacks: Vec<ProviderConfig>,
    pub servers: Vec<ServerSpec>,
    pub search_paths: Vec<PathBuf>,
    pub python: Option<PathBuf>,
    pub execution: ExecutionParams,
    pub session: SessionOptions,
    pub supervisor: SupervisorOptions,
    pub verbose: bool,
    pub conversation_log: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl GatewayConfig {
    /// Validate `file` and build the runtime settings, reporting every
    /// problem found rather than stopping at the first.
    ///
    /// `lookup` resolves `$VAR` credential references so that a missing
    /// key is reported here instead of on the first LLM call.
    pub fn from_file(
        file: &FileConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        let t = &file.timeouts;
        let o = &file.orchestration;
        let s = &file.supervisor;
        for (field, value) in [
            ("timeouts.handshake_secs", t.handshake_secs),
            ("timeouts.list_tools_secs", t.list_tools_secs),
            ("timeouts.tool_call_secs", t.tool_call_secs),
            ("timeouts.adapter_secs", t.adapter_secs),
            ("timeouts.shutdown_grace_secs", t.shutdown_grace_secs),
            ("orchestration.max_tool_rounds", o.max_tool_rounds as u64),
            ("supervisor.launch_probe_ms", s.launch_probe_ms),
        ] {
            if value == 0 {
                errors.push(ConfigValidationError::ZeroValue(field));
            }
        }

        let adapter_timeout = Duration::from_secs(t.adapter_secs);
        let provider = provider_config(&file.llm, "llm", adapter_timeout, &lookup, &mut errors);
        let fallbacks: Vec<ProviderConfig> = file
            .fallback
            .iter()
            .enumerate()
            .filter_map(|(i, llm)| {
                provider_config(llm, &format!("fallback[{i}]"), adapter_timeout, &lookup, &mut errors)
            })
            .collect();

        let servers = server_specs(file, &mut errors);

        match provider {
            Some(provider) if errors.is_empty() => Ok(Self {
                provider,
                fallbacks,
                servers,
                search_paths: s.search_paths.clone(),
                python: s.python.clone(),
                execution: ExecutionParams::default()
                    .with_max_tool_rounds(o.max_tool_rounds)
                    .with_adapter_retries(o.adapter_retries)
                    .with_retry_base_delay(Duration::from_millis(o.retry_base_delay_ms))
                    .with_tool_call_timeout(Duration::from_secs(t.tool_call_secs))
                    .with_list_tools_timeout(Duration::from_secs(t.list_tools_secs))
                    .with_adapter_timeout(adapter_timeout),
                session: SessionOptions::default()
                    .with_handshake_timeout(Duration::from_secs(t.handshake_secs)),
                supervisor: SupervisorOptions::default()
                    .with_grace_period(Duration::from_secs(t.shutdown_grace_secs))
                    .with_launch_probe(Duration::from_millis(s.launch_probe_ms))
                    .with_max_restarts(s.max_restarts)
                    .with_restart_base_delay(Duration::from_millis(s.restart_base_delay_ms)),
                verbose: file.verbose,
                conversation_log: file.logging.conversation_log.clone(),
                log_file: file.logging.file.clone(),
            }),
            _ => Err(errors),
        }
    }

    /// Resolver over the configured servers and search paths.
    pub fn resolver(&self) -> ServerResolver {
        let resolver = ServerResolver::new(self.servers.iter().cloned())
            .with_search_roots(self.search_paths.clone());
        match &self.python {
            Some(python) => resolver.with_interpreter(python),
            None => resolver,
        }
    }
}

fn provider_config(
    llm: &FileLlmConfig,
    section: &str,
    request_timeout: Duration,
    lookup: &impl Fn(&str) -> Option<String>,
    errors: &mut Vec<ConfigValidationError>,
) -> Option<ProviderConfig> {
    let Some(name) = llm.provider.as_deref() else {
        errors.push(ConfigValidationError::MissingProvider {
            section: section.to_string(),
        });
        return None;
    };
    let kind: ProviderKind = match name.parse() {
        Ok(kind) => kind,
        Err(e) => {
            errors.push(ConfigValidationError::UnknownProvider {
                section: section.to_string(),
                message: e.to_string(),
            });
            return None;
        }
    };

    if let Some(value) = llm.temperature
        && !(0.0..=2.0).contains(&value)
    {
        errors.push(ConfigValidationError::InvalidTemperature {
            section: section.to_string(),
            value,
        });
    }

    let defaults = ProviderOptions::default();
    let options = ProviderOptions {
        host: llm.host.clone().filter(|h| !h.trim().is_empty()),
        temperature: llm.temperature,
        max_tokens: llm.max_tokens.unwrap_or(defaults.max_tokens),
        request_timeout,
        system_prompt: llm.system_prompt.clone().unwrap_or(defaults.system_prompt),
    };
    let mut config = ProviderConfig::new(kind)
        .with_model(llm.model.clone().unwrap_or_default())
        .with_options(options);
    if let Some(key) = &llm.api_key {
        config = config.with_credential(Credential::parse(key));
    }

    if let Err(e) = config.resolve_credential(lookup) {
        errors.push(ConfigValidationError::MissingCredential(e.to_string()));
    }
    Some(config)
}

fn server_specs(file: &FileConfig, errors: &mut Vec<ConfigValidationError>) -> Vec<ServerSpec> {
    if file.mcp.is_empty() {
        errors.push(ConfigValidationError::NoServers);
        return Vec::new();
    }

    let mut seen = BTreeSet::new();
    let mut specs = Vec::new();
    for (index, (name, options)) in file.mcp.iter().flat_map(|e| e.servers()).enumerate() {
        let name = name.trim().to_string();
        if name.is_empty() {
            errors.push(ConfigValidationError::EmptyServerName(index));
            continue;
        }
        if !seen.insert(name.clone()) {
            errors.push(ConfigValidationError::DuplicateServer(name));
            continue;
        }
        specs.push(ServerSpec {
            name,
            command: options.command.filter(|c| !c.trim().is_empty()),
            args: options.args,
            env: options.env,
            cwd: options.cwd,
            framing: options.framing,
        });
    }
    specs
}
