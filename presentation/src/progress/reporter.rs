//! Progress reporting while the orchestrator works

use crate::output::console::ConsoleFormatter;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;
use wrp_application::ConversationProgress;
use wrp_domain::{ProviderKind, ToolCall, ToolOutput};

/// Spinner while the LLM thinks, with tool traffic printed above it
/// when `verbose` is set.
pub struct ProgressReporter {
    spinner: Mutex<Option<ProgressBar>>,
    verbose: bool,
}

impl ProgressReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            spinner: Mutex::new(None),
            verbose,
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold.cyan} {msg} {elapsed:.dimmed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<ProgressBar>> {
        self.spinner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Print a line without tearing the spinner.
    fn println(&self, line: String) {
        match self.slot().as_ref() {
            Some(pb) => pb.println(line),
            None => println!("{line}"),
        }
    }
}

impl ConversationProgress for ProgressReporter {
    fn on_adapter_start(&self, provider: ProviderKind, model: &str, round: usize) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(Self::spinner_style());
        pb.set_prefix(format!("{provider}/{model}"));
        pb.set_message(if round == 1 {
            "thinking...".to_string()
        } else {
            format!("thinking (round {round})...")
        });
        pb.enable_steady_tick(Duration::from_millis(100));

        if let Some(old) = self.slot().replace(pb) {
            old.finish_and_clear();
        }
    }

    fn on_adapter_end(&self) {
        if let Some(pb) = self.slot().take() {
            pb.finish_and_clear();
        }
    }

    fn on_adapter_retry(&self, provider: ProviderKind, attempt: usize, error: &str) {
        self.println(format!(
            "  {} {} retry #{}: {}",
            "!".yellow(),
            provider,
            attempt,
            error
        ));
    }

    fn on_adapter_fallback(&self, from: ProviderKind, to: ProviderKind) {
        self.println(format!(
            "  {} {} unavailable, falling back to {}",
            "!".yellow(),
            from,
            to.to_string().bold()
        ));
    }

    fn on_tool_call(&self, call: &ToolCall, server: &str) {
        if self.verbose {
            self.println(ConsoleFormatter::format_tool_call(call, server));
        }
    }

    fn on_tool_result(&self, call: &ToolCall, output: &ToolOutput) {
        if self.verbose || output.is_error() {
            self.println(ConsoleFormatter::format_tool_result(call, output));
        }
    }
}

/// Plain line-based progress (no spinner), for non-interactive runs.
pub struct SimpleProgress {
    verbose: bool,
}

impl SimpleProgress {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ConversationProgress for SimpleProgress {
    fn on_adapter_retry(&self, provider: ProviderKind, attempt: usize, error: &str) {
        eprintln!("{} {} retry #{}: {}", "!".yellow(), provider, attempt, error);
    }

    fn on_adapter_fallback(&self, from: ProviderKind, to: ProviderKind) {
        eprintln!("{} {} unavailable, falling back to {}", "!".yellow(), from, to);
    }

    fn on_tool_call(&self, call: &ToolCall, server: &str) {
        if self.verbose {
            println!("{}", ConsoleFormatter::format_tool_call(call, server));
        }
    }

    fn on_tool_result(&self, call: &ToolCall, output: &ToolOutput) {
        if self.verbose {
            println!("{}", ConsoleFormatter::format_tool_result(call, output));
        }
    }
}
