//! CLI entrypoint for wrp
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use wrp_application::{ConversationProgress, LlmAdapter, Orchestrator, ToolRegistry};
use wrp_infrastructure::{
    ConfigLoader, Gateway, GatewayConfig, JsonlConversationLogger, ProcessSupervisor,
    build_adapter,
};
use wrp_presentation::{
    ChatRepl, Cli, ConsoleFormatter, ProgressReporter, ServerDirectory, ServerSummary,
    SimpleProgress,
};

/// [`ServerDirectory`] over the live gateway.
struct GatewayDirectory(Arc<Gateway>);

#[async_trait]
impl ServerDirectory for GatewayDirectory {
    fn summaries(&self) -> Vec<ServerSummary> {
        self.0
            .status()
            .into_iter()
            .map(|status| ServerSummary {
                state: status
                    .state
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "not connected".to_string()),
                process: status.process.to_string(),
                session_id: status.session_id,
                tools: status.tools,
                detail: status.close_reason,
                name: status.name,
            })
            .collect()
    }

    async fn reconnect_closed(&self) -> Vec<(String, String)> {
        self.0
            .ensure_connected()
            .await
            .into_iter()
            .map(|(name, e)| (name, e.to_string()))
            .collect()
    }
}

/// Initialize tracing. `RUST_LOG` wins over the `-v` count; with a log
/// file the returned guard must live until exit so buffered lines flush.
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let file_name = path
        .file_name()
        .with_context(|| format!("log file path has no file name: {}", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.conf.as_deref());
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", ConsoleFormatter::format_error(&format!("{e:#}")));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // === Configuration ===
    let file = ConfigLoader::load(cli.conf.as_deref())?;
    let config = match GatewayConfig::from_file(&file, |name| std::env::var(name).ok()) {
        Ok(config) => config,
        Err(errors) => {
            for error in &errors {
                eprintln!("{}", ConsoleFormatter::format_error(&error.to_string()));
            }
            bail!("configuration is invalid ({} problems)", errors.len());
        }
    };

    let log_file = cli.log_file.as_deref().or(config.log_file.as_deref());
    let _log_guard = init_logging(cli.verbose, log_file)?;
    info!("Starting wrp {}", env!("CARGO_PKG_VERSION"));

    // === Dependency Injection ===
    let primary = build_adapter(&config.provider)?;
    let mut fallbacks: Vec<Arc<dyn LlmAdapter>> = Vec::new();
    for fallback in &config.fallbacks {
        match build_adapter(fallback) {
            Ok(adapter) => fallbacks.push(adapter),
            Err(e) => warn!("Skipping fallback {}: {}", fallback.kind(), e),
        }
    }

    let registry = Arc::new(ToolRegistry::new(config.execution.list_tools_timeout));
    let supervisor = ProcessSupervisor::new(config.resolver(), config.supervisor.clone());
    let gateway = Arc::new(Gateway::new(
        supervisor,
        Arc::clone(&registry),
        config.session.clone(),
    ));

    let report = gateway.connect_all().await;
    for (server, error) in &report.failed {
        eprintln!(
            "{}",
            ConsoleFormatter::format_error(&format!("server '{server}' did not start: {error}"))
        );
    }
    if !report.any_connected() {
        gateway.shutdown().await;
        bail!("no MCP server could be connected");
    }

    let verbose = cli.shows_tool_traffic(config.verbose);
    let progress: Arc<dyn ConversationProgress> = if cli.no_progress {
        Arc::new(SimpleProgress::new(verbose))
    } else {
        Arc::new(ProgressReporter::new(verbose))
    };

    let mut orchestrator = Orchestrator::new(primary, registry)
        .with_params(config.execution.clone())
        .with_progress(progress);
    for adapter in fallbacks {
        orchestrator = orchestrator.with_fallback(adapter);
    }
    if let Some(path) = &config.conversation_log {
        let logger = JsonlConversationLogger::open(path)
            .with_context(|| format!("cannot open conversation log {}", path.display()))?;
        info!("Conversation log: {}", logger.path().display());
        orchestrator = orchestrator.with_conversation_logger(Arc::new(logger));
    }

    let directory = Arc::new(GatewayDirectory(Arc::clone(&gateway)));
    let mut repl = ChatRepl::new(orchestrator, directory);

    // === Run ===
    let code = match &cli.query {
        Some(query) => match repl.process_query(query).await {
            Ok(answer) => {
                println!("{}", ConsoleFormatter::format_answer(&answer));
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", ConsoleFormatter::format_error(&e.to_string()));
                ExitCode::FAILURE
            }
        },
        None => match repl.run().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{}", ConsoleFormatter::format_error(&format!("stdin: {e}")));
                ExitCode::FAILURE
            }
        },
    };

    gateway.shutdown().await;
    Ok(code)
}
