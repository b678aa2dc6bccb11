//! Rotary — snapshot backups over rsync.
//!
//! # Usage
//!
//! ```text
//! rotary [--config <path>] [--verbose] rotate [--target <name>] [--dry-run]
//! rotary [--config <path>] [--verbose] prune <workdir> [--dry] [--keep <n>] [--json]
//! rotary [--config <path>] config check
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config::ConfigCommand, prune::PruneArgs, rotate::RotateArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "rotary",
    version,
    about = "Rotate rsync snapshots between hosts and prune old ones",
    long_about = None,
)]
struct Cli {
    /// Config file (default: ~/.rotary/config.yaml).
    #[arg(long, short = 'c', global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Transfer every configured directory to its targets.
    Rotate(RotateArgs),

    /// Remove old snapshots from a working directory.
    Prune(PruneArgs),

    /// Inspect the configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = commands::load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Rotate(args) => args.run(&config),
        Commands::Prune(args) => args.run(&config),
        Commands::Config { command } => commands::config::run(command, &config),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
