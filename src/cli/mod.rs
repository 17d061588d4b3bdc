//! Command-line interface for llm-engineering.
//!
//! Selects which pipelines to run and applies settings overrides.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
