//! CLI subcommand implementations.

pub mod replay;
pub mod run;
pub mod summarize;
