//! Presentation layer for wrp
//!
//! This crate contains the CLI definition, transcript formatting,
//! progress reporting and the interactive chat loop.

pub mod chat;
pub mod cli;
pub mod output;
pub mod progress;

// Re-export commonly used types
pub use chat::{ChatRepl, Command, ServerDirectory, ServerSummary};
pub use cli::commands::Cli;
pub use output::console::ConsoleFormatter;
pub use output::formatter::OutputFormatter;
pub use progress::reporter::{ProgressReporter, SimpleProgress};
