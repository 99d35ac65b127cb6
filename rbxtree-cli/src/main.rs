//! rbxtree: move an instance graph between extraction chunks, a directory
//! tree and a live sync server.
//!
//! # Usage
//!
//! ```text
//! rbxtree consolidate [EXTRACT_DIR] [OUTPUT_DIR] [--extract-scripts] [--top N]
//! rbxtree write-tree [DATASET] [PROJECT_DIR]
//! rbxtree sync [PATH] [-b N] [-l N] [-s SERVICE] [--server URL] [--config FILE] [--dry-run] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{consolidate::ConsolidateArgs, sync::SyncArgs, write_tree::WriteTreeArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "rbxtree",
    version,
    about = "Consolidate, materialize and sync an instance tree",
    long_about = None,
)]
struct Cli {
    /// Log debug detail (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge extraction chunks into one dataset and a kind summary.
    Consolidate(ConsolidateArgs),

    /// Write a dataset out as a `src/` directory tree.
    WriteTree(WriteTreeArgs),

    /// Push a directory tree (or one file) to the sync server.
    Sync(SyncArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Consolidate(args) => args.run(),
        Commands::WriteTree(args) => args.run(),
        Commands::Sync(args) => args.run(),
    }
}

/// Log to stderr so `--json` output on stdout stays clean.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
