//! Command implementations for the CLI
//!
//! - emit: record one security event through the configured sink
//! - config: configuration display and validation

pub mod config;
pub mod emit;
