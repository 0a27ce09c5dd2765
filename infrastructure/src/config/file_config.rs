//! Raw configuration data types
//!
//! These structs mirror the configuration file exactly (YAML or TOML).
//! They are deserialized as-is and turned into runtime settings by
//! [`GatewayConfig::from_file`](super::GatewayConfig::from_file).

use crate::mcp::transport::Framing;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigValidationError {
    #[error("{section}.provider is required")]
    MissingProvider { section: String },

    #[error("{section}.provider: {message}")]
    UnknownProvider { section: String, message: String },

    #[error("{section}.temperature must be between 0 and 2 (got {value})")]
    InvalidTemperature { section: String, value: f32 },

    #[error("{0}")]
    MissingCredential(String),

    #[error("mcp: at least one server must be configured")]
    NoServers,

    #[error("mcp: server entry #{0} has an empty name")]
    EmptyServerName(usize),

    #[error("mcp: server '{0}' is configured more than once")]
    DuplicateServer(String),

    #[error("{0} cannot be 0")]
    ZeroValue(&'static str),
}

/// One LLM backend (`llm` section and each `fallback` entry)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLlmConfig {
    /// Backend name: openai, claude, gemini, ollama
    pub provider: Option<String>,
    /// Model identifier (backend default when omitted)
    #[serde(alias = "model_name")]
    pub model: Option<String>,
    /// API key, or `$VAR` to read it from the environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL override
    pub host: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

/// Launch settings for one server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileServerOptions {
    /// Command to run. A `.py` path runs under the Python interpreter;
    /// when omitted the server is found by name in the search paths.
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub framing: Framing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileServerConfig {
    pub name: String,
    #[serde(flatten)]
    pub options: FileServerOptions,
}

/// An `mcp` list entry.
///
/// ```yaml
/// mcp:
///   - Jarvis                      # by name, found by convention
///   - name: Slurm                 # explicit command
///     command: uvx
///     args: [slurm-mcp]
///   - Adios:                      # keyed form
///       framing: content-length
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileServerEntry {
    Name(String),
    Detailed(FileServerConfig),
    Keyed(BTreeMap<String, Option<FileServerOptions>>),
}

impl FileServerEntry {
    /// Flatten into `(name, options)` pairs. A keyed entry may name
    /// several servers.
    pub fn servers(&self) -> Vec<(String, FileServerOptions)> {
        match self {
            FileServerEntry::Name(name) => vec![(name.clone(), FileServerOptions::default())],
            FileServerEntry::Detailed(config) => vec![(config.name.clone(), config.options.clone())],
            FileServerEntry::Keyed(map) => map
                .iter()
                .map(|(name, options)| (name.clone(), options.clone().unwrap_or_default()))
                .collect(),
        }
    }
}

/// `timeouts` section, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTimeoutsConfig {
    pub handshake_secs: u64,
    pub list_tools_secs: u64,
    pub tool_call_secs: u64,
    pub adapter_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for FileTimeoutsConfig {
    fn default() -> Self {
        Self {
            handshake_secs: 30,
            list_tools_secs: 30,
            tool_call_secs: 120,
            adapter_secs: 180,
            shutdown_grace_secs: 5,
        }
    }
}

/// `orchestration` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOrchestrationConfig {
    pub max_tool_rounds: usize,
    pub adapter_retries: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for FileOrchestrationConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 10,
            adapter_retries: 2,
            retry_base_delay_ms: 1000,
        }
    }
}

/// `supervisor` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSupervisorConfig {
    /// Roots searched for `server.py` when a server has no command
    pub search_paths: Vec<PathBuf>,
    /// Python interpreter for `.py` servers (found on `PATH` when unset)
    pub python: Option<PathBuf>,
    pub max_restarts: u32,
    pub restart_base_delay_ms: u64,
    pub launch_probe_ms: u64,
}

impl Default for FileSupervisorConfig {
    fn default() -> Self {
        Self {
            search_paths: vec![PathBuf::from(".")],
            python: None,
            max_restarts: 3,
            restart_base_delay_ms: 1000,
            launch_probe_ms: 150,
        }
    }
}

/// `logging` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// JSONL transcript of every conversation event
    pub conversation_log: Option<PathBuf>,
    /// Diagnostic log file (stderr when unset)
    pub file: Option<PathBuf>,
}

/// Complete file configuration (raw structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub llm: FileLlmConfig,
    /// Backends tried in order when `llm` keeps failing
    pub fallback: Vec<FileLlmConfig>,
    pub mcp: Vec<FileServerEntry>,
    pub verbose: bool,
    pub timeouts: FileTimeoutsConfig,
    pub orchestration: FileOrchestrationConfig,
    pub supervisor: FileSupervisorConfig,
    pub logging: FileLoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_toml() {
        let toml_str = r#"
verbose = true
mcp = ["Jarvis", { name = "Slurm", command = "uvx", args = ["slurm-mcp"], framing = "content-length" }]

[llm]
provider = "openai"
model = "gpt-4o"
api_key = "$OPENAI_API_KEY"

[timeouts]
tool_call_secs = 30
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert!(config.verbose);
        assert_eq!(config.llm.provider.as_deref(), Some("openai"));
        assert_eq!(config.timeouts.tool_call_secs, 30);
        assert_eq!(config.timeouts.handshake_secs, 30);

        let servers: Vec<_> = config.mcp.iter().flat_map(|e| e.servers()).collect();
        assert_eq!(servers[0].0, "Jarvis");
        assert_eq!(servers[0].1, FileServerOptions::default());
        assert_eq!(servers[1].0, "Slurm");
        assert_eq!(servers[1].1.command.as_deref(), Some("uvx"));
        assert_eq!(servers[1].1.framing, Framing::ContentLength);
    }

    #[test]
    fn test_keyed_entry() {
        let toml_str = r#"
[[mcp]]
[mcp.Adios]
args = ["--debug"]
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        let servers = config.mcp[0].servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].0, "Adios");
        assert_eq!(servers[0].1.args, vec!["--debug"]);
    }

    #[test]
    fn test_model_name_alias() {
        let config: FileLlmConfig =
            toml::from_str("provider = \"gemini\"\nmodel_name = \"gemini-1.5-pro\"").unwrap();
        assert_eq!(config.model.as_deref(), Some("gemini-1.5-pro"));
    }

    #[test]
    fn test_default_config() {
        let config = FileConfig::default();
        assert!(config.mcp.is_empty());
        assert!(!config.verbose);
        assert_eq!(config.orchestration.max_tool_rounds, 10);
        assert_eq!(config.supervisor.search_paths, vec![PathBuf::from(".")]);
    }
}
