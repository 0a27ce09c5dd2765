//! Core domain concepts shared across all subdomains.
//!
//! - [`error::DomainError`]: domain-level errors
//! - [`string::preview`]: one-line previews for logs and transcripts

pub mod error;
pub mod string;
