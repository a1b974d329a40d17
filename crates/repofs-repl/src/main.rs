//! repofs entry point.
//!
//! Mount a local checkout as the remote snapshot and edit it interactively:
//! ```bash
//! cargo run -p repofs-repl -- ~/src/project
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repofs_repl::ReplConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "repofs")]
struct Cli {
    /// Directory serving the snapshot's file content
    snapshot: Option<PathBuf>,

    /// Mount point of the repository
    #[arg(long)]
    repo_root: Option<String>,

    /// JSON manifest to use instead of walking the snapshot directory
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Config file (default: ~/.config/repofs/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run `;`-separated commands and exit
    #[arg(short = 'c', long = "command")]
    command: Option<String>,
}

fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ReplConfig::load_from(path)?,
        None => ReplConfig::load().context("Failed to load configuration")?,
    };
    if let Some(dir) = &cli.snapshot {
        config.snapshot.dir = Some(repofs_repl::absolute(dir)?);
    }
    if let Some(manifest) = &cli.manifest {
        config.snapshot.manifest = Some(repofs_repl::absolute(manifest)?);
    }
    if let Some(repo_root) = cli.repo_root {
        config.snapshot.repo_root = repo_root;
    }

    match cli.command {
        Some(commands) => repofs_repl::run_commands(&config, &commands),
        None => repofs_repl::run(&config),
    }
}
