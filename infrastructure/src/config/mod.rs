//! Configuration loading for wrp
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `WRP_` environment variables (`WRP_LLM__PROVIDER=ollama`)
//! 2. `--conf <path>` specified file (YAML or TOML by extension)
//! 3. Global config: `$XDG_CONFIG_HOME/wrp/config.toml`
//! 4. Default values
//!
//! The merged [`FileConfig`] is then validated into a [`GatewayConfig`].

mod file_config;
mod loader;
mod runtime;

pub use file_config::{
    ConfigValidationError, FileConfig, FileLlmConfig, FileLoggingConfig, FileOrchestrationConfig,
    FileServerConfig, FileServerEntry, FileServerOptions, FileSupervisorConfig, FileTimeoutsConfig,
};
pub use loader::{ConfigLoadError, ConfigLoader, ENV_PREFIX};
pub use runtime::GatewayConfig;
