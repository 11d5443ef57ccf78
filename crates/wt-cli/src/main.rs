use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wt_cli::commands::{replay, run, summarize};
use wt_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr; stdout carries statuses and exports
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match &cli.command {
        Some(Commands::Run { json, url }) => {
            let mut config =
                Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
            if let Some(url) = url {
                config.server_url.clone_from(url);
            }
            tracing::debug!(?config, "loaded configuration");
            run::run(&config, *json)?;
        }
        Some(Commands::Replay { input, output }) => {
            let mut stdout = std::io::stdout().lock();
            replay::run(&mut stdout, input, output.as_deref())?;
        }
        Some(Commands::Summarize { file }) => {
            let mut stdout = std::io::stdout().lock();
            summarize::run(&mut stdout, file)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
