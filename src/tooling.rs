//! Tooling & Integration Layer
//!
//! Command-line entry point of the sync daemon.

pub mod cli;

pub use cli::{Cli, CliContext};
