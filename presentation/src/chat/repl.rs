//! REPL (Read-Eval-Print Loop) for interactive chat

use super::directory::ServerDirectory;
use crate::ConsoleFormatter;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wrp_application::{Orchestrator, OrchestratorError};

/// One line of user input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Quit,
    Help,
    Tools,
    Servers,
    Unknown(String),
    Query(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            return Command::Quit;
        }
        if !line.starts_with('/') {
            return Command::Query(line.to_string());
        }
        match line {
            "/quit" | "/exit" | "/q" => Command::Quit,
            "/help" | "/h" | "/?" => Command::Help,
            "/tools" => Command::Tools,
            "/servers" => Command::Servers,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// Interactive chat REPL
pub struct ChatRepl {
    orchestrator: Orchestrator,
    directory: Arc<dyn ServerDirectory>,
}

impl ChatRepl {
    pub fn new(orchestrator: Orchestrator, directory: Arc<dyn ServerDirectory>) -> Self {
        Self {
            orchestrator,
            directory,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run the interactive loop on stdin.
    pub async fn run(&mut self) -> std::io::Result<()> {
        self.run_with(BufReader::new(tokio::io::stdin())).await
    }

    /// Run the loop on any line source. Ends on `quit`, EOF or Ctrl-C at
    /// the prompt; Ctrl-C during a query cancels only that query.
    pub async fn run_with<R: AsyncBufRead + Unpin>(&mut self, input: R) -> std::io::Result<()> {
        self.print_welcome();
        let mut lines = input.lines();

        loop {
            print!("Query: ");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    println!("^C");
                    None
                }
            };
            let Some(line) = line else {
                println!("Bye!");
                break;
            };

            match Command::parse(&line) {
                Command::Empty => continue,
                Command::Quit => {
                    println!("Bye!");
                    break;
                }
                Command::Help => Self::print_help(),
                Command::Tools => {
                    let catalog = self.orchestrator.registry().catalog().await;
                    println!("{}", ConsoleFormatter::format_catalog(&catalog));
                }
                Command::Servers => {
                    println!(
                        "{}",
                        ConsoleFormatter::format_servers(&self.directory.summaries())
                    );
                }
                Command::Unknown(cmd) => {
                    println!("Unknown command: {}", cmd);
                    println!("Type /help for available commands");
                }
                Command::Query(query) => {
                    match self.process_query(&query).await {
                        Ok(answer) => println!("{}", ConsoleFormatter::format_answer(&answer)),
                        Err(e) if e.is_cancelled() => println!("(cancelled)"),
                        Err(e) => eprintln!("{}", ConsoleFormatter::format_error(&e.to_string())),
                    }
                    println!();
                }
            }
        }

        Ok(())
    }

    /// Run one query, reconnecting closed servers first.
    pub async fn process_query(&mut self, query: &str) -> Result<String, OrchestratorError> {
        for (server, error) in self.directory.reconnect_closed().await {
            warn!(server = %server, "Chat: server unavailable: {}", error);
            eprintln!(
                "{}",
                ConsoleFormatter::format_error(&format!("server '{server}' is unavailable: {error}"))
            );
        }

        let cancel = CancellationToken::new();
        let run = self.orchestrator.run(query, &cancel);
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Chat: interrupted, cancelling query");
                cancel.cancel();
                run.await
            }
        }
    }

    fn print_welcome(&self) {
        let adapter = self.orchestrator.primary_adapter();
        let servers = self.directory.summaries();
        let ready = servers.iter().filter(|s| s.is_ready()).count();

        println!();
        println!("╭─────────────────────────────────────────────╮");
        println!("│                  WRP chat                   │");
        println!("╰─────────────────────────────────────────────╯");
        println!();
        println!("LLM:     {} ({})", adapter.kind(), adapter.model());
        println!(
            "Servers: {} ({} of {} ready)",
            servers
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            ready,
            servers.len()
        );
        println!();
        println!("Type a query, or /help for commands.");
        println!();
    }

    fn print_help() {
        println!();
        println!("Commands:");
        println!("  /tools            - List the tools the LLM can call");
        println!("  /servers          - Show server and session health");
        println!("  /help, /h, /?     - Show this help");
        println!("  quit, exit, /quit - Exit chat");
        println!();
        println!("Ctrl-C cancels a running query.");
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ServerSummary;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wrp_application::{AdapterError, LlmAdapter, ToolRegistry};
    use wrp_domain::{AdapterReply, AdvertisedTool, Conversation, ProviderKind};

    struct EchoAdapter;

    #[async_trait]
    impl LlmAdapter for EchoAdapter {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Ollama
        }

        fn model(&self) -> &str {
            "echo"
        }

        async fn chat(
            &self,
            conversation: &Conversation,
            _tools: &[AdvertisedTool],
        ) -> Result<AdapterReply, AdapterError> {
            Ok(AdapterReply::text(format!("{} turns", conversation.len())))
        }
    }

    #[derive(Default)]
    struct Directory {
        heals: AtomicUsize,
        failures: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ServerDirectory for Directory {
        fn summaries(&self) -> Vec<ServerSummary> {
            vec![ServerSummary {
                name: "Echo".into(),
                state: "ready".into(),
                process: "running".into(),
                session_id: Some(1),
                tools: Some(0),
                detail: None,
            }]
        }

        async fn reconnect_closed(&self) -> Vec<(String, String)> {
            self.heals.fetch_add(1, Ordering::SeqCst);
            self.failures.lock().unwrap().clone()
        }
    }

    fn repl(directory: Arc<Directory>) -> ChatRepl {
        let registry = Arc::new(ToolRegistry::new(Duration::from_secs(1)));
        ChatRepl::new(Orchestrator::new(Arc::new(EchoAdapter), registry), directory)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(Command::parse("quit"), Command::Quit);
        assert_eq!(Command::parse("EXIT"), Command::Quit);
        assert_eq!(Command::parse("/q"), Command::Quit);
        assert_eq!(Command::parse("/tools"), Command::Tools);
        assert_eq!(Command::parse("/servers"), Command::Servers);
        assert_eq!(Command::parse("/?"), Command::Help);
        assert_eq!(Command::parse("/bogus"), Command::Unknown("/bogus".into()));
        assert_eq!(
            Command::parse("  list my jobs "),
            Command::Query("list my jobs".into())
        );
    }

    #[tokio::test]
    async fn test_queries_share_one_conversation() {
        let directory = Arc::new(Directory::default());
        let mut repl = repl(directory.clone());

        let input: &[u8] = b"first\n/tools\n/servers\n\nsecond\nquit\nnever\n";
        repl.run_with(input).await.unwrap();

        // user + assistant per query
        assert_eq!(repl.orchestrator().conversation().len(), 4);
        assert_eq!(directory.heals.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_eof_ends_loop() {
        let mut repl = repl(Arc::new(Directory::default()));
        let input: &[u8] = b"/help\n";
        repl.run_with(input).await.unwrap();
        assert!(repl.orchestrator().conversation().is_empty());
    }

    #[tokio::test]
    async fn test_query_runs_despite_unavailable_server() {
        let directory = Arc::new(Directory::default());
        directory
            .failures
            .lock()
            .unwrap()
            .push(("Adios".into(), "launch failed".into()));
        let mut repl = repl(directory);
        assert_eq!(repl.process_query("hi").await.unwrap(), "1 turns");
    }
}
