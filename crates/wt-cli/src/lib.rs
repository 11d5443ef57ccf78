//! Weight tracker CLI library.
//!
//! This crate connects the core engine to the scale server and the operator:
//! the websocket transport, the engine task, configuration, and the CLI
//! subcommands.

pub mod actor;
mod cli;
pub mod commands;
mod config;
pub mod protocol;
pub mod transport;

pub use cli::{Cli, Commands};
pub use config::Config;
