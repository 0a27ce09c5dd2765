//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment, Metadata, Profile, Provider,
    providers::{Env, Format, Toml, Yaml},
    value::{Dict, Map, Value},
};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix for environment overrides (`WRP_LLM__MODEL=gpt-4o`).
pub const ENV_PREFIX: &str = "WRP_";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Parse(#[from] Box<figment::Error>),
}

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `WRP_` environment variables
    /// 2. Explicit config path (if provided)
    /// 3. Global config: `$XDG_CONFIG_HOME/wrp/config.toml`
    /// 4. Default values
    pub fn load(config_path: Option<&Path>) -> Result<FileConfig, ConfigLoadError> {
        Self::figment(Self::global_config_path().as_deref(), config_path)?
            .extract()
            .map_err(|e| ConfigLoadError::Parse(Box::new(e)))
    }

    /// The merged figment, exposed for `--show-config` and tests.
    pub fn figment(
        global_path: Option<&Path>,
        config_path: Option<&Path>,
    ) -> Result<Figment, ConfigLoadError> {
        let mut figment = Figment::new();

        if let Some(global) = global_path
            && global.exists()
        {
            figment = figment.merge(LegacyKeys(Toml::file(global)));
        }

        if let Some(path) = config_path {
            if !path.is_file() {
                return Err(ConfigLoadError::NotFound(path.to_path_buf()));
            }
            figment = if Self::is_yaml(path) {
                figment.merge(LegacyKeys(Yaml::file(path)))
            } else {
                figment.merge(LegacyKeys(Toml::file(path)))
            };
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn is_yaml(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
    }

    /// Get the global config file path
    ///
    /// Returns `$XDG_CONFIG_HOME/wrp/config.toml` if set,
    /// otherwise the platform config directory.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("wrp").join("config.toml"))
    }

    /// Print the config file locations being used (for debugging)
    pub fn print_config_sources(config_path: Option<&Path>) {
        println!("Configuration sources (in priority order):");
        println!("  [     ] Environment: {ENV_PREFIX}* variables");

        if let Some(path) = config_path {
            let mark = if path.is_file() { "FOUND" } else { "MISSING" };
            println!("  [{mark:^5}] Explicit: {}", path.display());
        }

        if let Some(path) = Self::global_config_path() {
            let mark = if path.exists() { "FOUND" } else { "     " };
            println!("  [{mark}] Global:  {}", path.display());
        }

        println!("  [     ] Default: built-in defaults");
    }
}

/// Accepts the capitalized key spellings older configuration files use
/// (`LLM`, `Provider`, `MCP`, `Verbose`, `model_name`) by lowercasing the
/// top-level keys and those of the `llm` section.
struct LegacyKeys<P>(P);

impl<P: Provider> Provider for LegacyKeys<P> {
    fn metadata(&self) -> Metadata {
        self.0.metadata()
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        let mut data = self.0.data()?;
        for dict in data.values_mut() {
            let mut normalized = lowercase_keys(std::mem::take(dict));
            if let Some(Value::Dict(_, llm)) = normalized.get_mut("llm") {
                *llm = lowercase_keys(std::mem::take(llm));
                if let Some(model) = llm.remove("model_name") {
                    llm.entry("model".to_string()).or_insert(model);
                }
            }
            *dict = normalized;
        }
        Ok(data)
    }
}

fn lowercase_keys(dict: Dict) -> Dict {
    dict.into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .collect()
}
