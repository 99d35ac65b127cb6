//! `rbxtree sync`: push a directory tree, or one file, to the sync server.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use rbxtree_core::{DefaultDirs, SyncConfig};
use rbxtree_fs::{find_source_root, ScanOptions};
use rbxtree_sync::{
    pipeline::{self, SyncScope},
    BatchOutcome, SyncSummary,
};

/// Arguments for `rbxtree sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Source directory or single file (default: `~/rbxsync/game_project/src`).
    pub path: Option<PathBuf>,

    /// Operations per batch (default: config, then 50).
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Stop after this many operations; 0 means no limit.
    #[arg(short, long, default_value_t = 0)]
    pub limit: usize,

    /// Only sync one top-level service, e.g. `ServerScriptService`.
    #[arg(short, long)]
    pub service: Option<String>,

    /// Sync server URL (default: config, then http://localhost:44755).
    #[arg(long)]
    pub server: Option<String>,

    /// Config file (default: `rbxtree.yaml` beside `src`).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Plan and apply against an in-memory host; nothing is sent.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct SyncJson<'a> {
    dry_run: bool,
    #[serde(flatten)]
    summary: &'a SyncSummary,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => DefaultDirs::from_home()
                .context("could not determine home directory")?
                .project()
                .join("src"),
        };
        let config = self.resolve_config(&path)?;

        let options = ScanOptions {
            scope: self.service.clone(),
            limit: self.limit,
        };
        let summary = pipeline::run(&config, SyncScope::detect(&path, options), self.dry_run)
            .with_context(|| format!("sync failed for {}", path.display()))?;

        if self.json {
            let payload = SyncJson {
                dry_run: self.dry_run,
                summary: &summary,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize sync JSON")?
            );
        } else {
            print_summary(&summary, self.dry_run);
        }

        if !summary.is_clean() {
            bail!("{} operation(s) failed", summary.dispatch.failed);
        }
        Ok(())
    }

    /// File config (explicit or discovered), then command-line overrides.
    fn resolve_config(&self, path: &Path) -> Result<SyncConfig> {
        let mut config = match &self.config {
            Some(file) => SyncConfig::load(file)
                .with_context(|| format!("failed to load config {}", file.display()))?,
            None => {
                let root = if path.is_file() {
                    find_source_root(path)
                } else {
                    Some(path.to_path_buf())
                };
                match root {
                    Some(root) => SyncConfig::discover(&root).context("failed to load config")?,
                    None => SyncConfig::default(),
                }
            }
        };
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        config.validate().context("invalid sync settings")?;
        Ok(config)
    }
}

fn print_summary(summary: &SyncSummary, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let report = &summary.dispatch;
    let elapsed = (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0;

    if summary.scanned == 0 {
        println!("{prefix}✓ nothing to sync in {}", summary.source_root.display());
        return;
    }

    let mark = if summary.is_clean() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!("{prefix}{mark} sync complete in {elapsed:.1}s");
    println!("  Succeeded: {}", report.succeeded);
    println!("  Failed:    {}", report.failed);
    println!(
        "  Scanned {} file(s) into {} operation(s){}",
        summary.files_seen,
        summary.scanned,
        if summary.truncated { " (limit reached)" } else { "" }
    );
    if !summary.synthesized.is_empty() {
        println!("  Created {} missing parent folder(s)", summary.synthesized.len());
    }
    if !summary.unresolved.is_empty() {
        println!(
            "  {} {} operation(s) may have missing parents",
            "!".yellow().bold(),
            summary.unresolved.len()
        );
    }
    for path in &summary.ambiguous_paths {
        println!("  {} {path} names more than one sibling", "!".yellow().bold());
    }
    if !summary.warnings.is_empty() {
        println!("  {} {} file(s) skipped", "!".yellow().bold(), summary.warnings.len());
    }

    for batch in report.batches.iter().filter(|b| b.outcome != BatchOutcome::Succeeded) {
        println!(
            "  {}  batch {} ({} ops): {}",
            "✗".red(),
            batch.index,
            batch.len,
            outcome_label(&batch.outcome)
        );
    }
}

fn outcome_label(outcome: &BatchOutcome) -> String {
    match outcome {
        BatchOutcome::Succeeded => "succeeded".to_string(),
        BatchOutcome::Partial { succeeded, failed } => {
            format!("partial, {succeeded} succeeded, {failed} failed")
        }
        BatchOutcome::NotAttached => "timed out on the server (plugin not connected?)".to_string(),
        BatchOutcome::Rejected { status } => format!("HTTP {status}"),
        BatchOutcome::TimedOut => "no reply before the timeout".to_string(),
        BatchOutcome::TransportFailed { reason } => reason.clone(),
    }
}
