//! Command-line interface for pipeforge.
//!
//! Provides commands for building pipelines from natural-language requests
//! and for inspecting the risk gate's verdict on a piece of input.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
