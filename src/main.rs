#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use configo::cli::{Cli, Commands};
use configo::commands;
use configo::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Config commands report broken files themselves
    if let Commands::Config { command } = &cli.command {
        commands::config::execute(command)?;
        return Ok(());
    }

    let config = Config::load(&std::env::current_dir()?)?.with_cli_overrides(&cli);

    let succeeded = match &cli.command {
        Commands::Install(cmd) => commands::install::execute(&config, cmd)?,
        Commands::Plan(cmd) => {
            commands::plan::execute(&config, cmd)?;
            true
        }
        Commands::Validate(cmd) => commands::validate::execute(&config, cmd)?,
        Commands::Memory { command } => {
            commands::memory::execute(&config, command)?;
            true
        }
        Commands::Config { .. } => true,
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

/// RUST_LOG wins; otherwise warnings only, or debug with --verbose
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "configo=debug" } else { "configo=warn" })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
