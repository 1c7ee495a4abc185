//! Quarry CLI library.
//!
//! Wires the store, provider, worker and service crates together behind the
//! `quarry` binary: configuration loading, command execution and output
//! formatting.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use app::App;
pub use cli::{Cli, Command};
pub use config::QuarryConfig;
pub use error::{CliError, Result};
pub use output::Formatter;
