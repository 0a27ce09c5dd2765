//! Interactive chat module
//!
//! Provides the `Query:` loop that feeds user input to the orchestrator.

mod directory;
mod repl;

pub use directory::{ServerDirectory, ServerSummary};
pub use repl::{ChatRepl, Command};
