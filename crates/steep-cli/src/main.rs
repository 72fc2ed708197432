use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

mod commands;
mod config;

use commands::{fetch::FetchCommand, resolve::ResolveCommand};

#[derive(Parser)]
#[command(name = "steep", version, about = "Steep module loader")]
struct Cli {
    /// Path to steep.toml (searched for upward from the current directory by default)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log loader activity
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical URL and kind of each specifier
    Resolve(ResolveCommand),
    /// Load each specifier and report what it produced
    Fetch(FetchCommand),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Resolve(cmd) => cmd.run(&config)?,
        Commands::Fetch(cmd) => cmd.run(&config).await?,
    }

    Ok(())
}
