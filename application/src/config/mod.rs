//! Application-level configuration.
//!
//! - [`ExecutionParams`]: orchestration loop limits and timeouts

pub mod execution_params;

pub use execution_params::ExecutionParams;
