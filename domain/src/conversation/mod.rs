//! Conversation domain module
//!
//! The [`Conversation`] is the single source of truth the orchestrator
//! feeds to an LLM adapter on every round; [`AdapterReply`] is what comes
//! back.

pub mod entities;
pub mod reply;

pub use entities::{Conversation, ToolResultTurn, Turn};
pub use reply::AdapterReply;
