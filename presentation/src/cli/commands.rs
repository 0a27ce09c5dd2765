//! CLI command definitions

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for wrp
#[derive(Parser, Debug)]
#[command(name = "wrp")]
#[command(author, version, about = "WRP chat - let an LLM call tools on MCP servers")]
#[command(long_about = r#"
WRP chat connects one LLM backend to one or more MCP tool servers.

The LLM sees every tool the servers offer; when it asks for one, the call
is routed to the right server and the result is fed back until the model
answers.

Configuration is merged from (highest priority first):
1. WRP_* environment variables      e.g. WRP_LLM__MODEL=gpt-4o
2. --conf <path>                    YAML or TOML, chosen by extension
3. ~/.config/wrp/config.toml        Global config

Example:
  wrp --conf GeminiJarvis.yaml
  wrp --conf OpenAIJarvis.yaml -q "Create a pipeline with two stages"
  wrp --conf Claude.toml -vv --log-file wrp.log
"#)]
pub struct Cli {
    /// Configuration file (YAML or TOML)
    #[arg(long, value_name = "PATH")]
    pub conf: Option<PathBuf>,

    /// Run a single query and exit instead of starting the chat loop
    #[arg(short = 'q', long = "query", value_name = "QUERY")]
    pub query: Option<String>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write diagnostic logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Suppress the progress spinner
    #[arg(long)]
    pub no_progress: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

impl Cli {
    /// Whether tool calls and results are echoed to the transcript.
    ///
    /// `-v` or `verbose: true` in the configuration file turns it on.
    pub fn shows_tool_traffic(&self, config_verbose: bool) -> bool {
        self.verbose > 0 || config_verbose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_single_query() {
        let cli = Cli::parse_from(["wrp", "--conf", "Gemini.yaml", "-q", "ping 7", "-vv"]);
        assert_eq!(cli.conf, Some(PathBuf::from("Gemini.yaml")));
        assert_eq!(cli.query.as_deref(), Some("ping 7"));
        assert_eq!(cli.verbose, 2);
        assert!(cli.shows_tool_traffic(false));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["wrp"]);
        assert!(cli.conf.is_none());
        assert!(cli.query.is_none());
        assert!(!cli.show_config);
        assert!(!cli.shows_tool_traffic(false));
        assert!(cli.shows_tool_traffic(true));
    }
}
