//! `rbxtree write-tree`: materialize a dataset into `<PROJECT_DIR>/src`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use rbxtree_core::{config::CONFIG_FILE, DefaultDirs, SyncConfig};
use rbxtree_fs::{consolidate::DATASET_FILE, materialize, Dataset};

use super::consolidate::print_warnings;

/// Arguments for `rbxtree write-tree`.
#[derive(Args, Debug)]
pub struct WriteTreeArgs {
    /// Consolidated dataset (default: `~/rbxsync/output/game_data.json`).
    pub dataset: Option<PathBuf>,

    /// Project directory; the tree goes into its `src/` (default: `~/rbxsync/game_project`).
    pub project_dir: Option<PathBuf>,
}

impl WriteTreeArgs {
    pub fn run(self) -> Result<()> {
        let dirs = DefaultDirs::from_home().context("could not determine home directory")?;
        let dataset_path = self
            .dataset
            .unwrap_or_else(|| dirs.consolidated().join(DATASET_FILE));
        let project_dir = self.project_dir.unwrap_or_else(|| dirs.project());
        let config = SyncConfig::load(&project_dir.join(CONFIG_FILE))
            .context("failed to load project config")?;

        println!("Reading {}...", dataset_path.display());
        let dataset = Dataset::load(&dataset_path)
            .with_context(|| format!("failed to load dataset {}", dataset_path.display()))?;
        println!("Loaded {} instance(s)", dataset.instances.len());

        let dest = project_dir.join("src");
        let stats = materialize(&dataset, &config.services, &dest)
            .with_context(|| format!("failed to write tree to {}", dest.display()))?;
        print_warnings(&stats.warnings);

        println!(
            "{} {} root service(s) written to {}",
            "✓".green().bold(),
            stats.roots,
            dest.display()
        );
        println!("  Directories:     {}", stats.dirs);
        println!("  .rbxjson files:  {}", stats.meta_files);
        println!("  Script files:    {}", stats.source_files);
        if !stats.skipped_existing.is_empty() {
            println!(
                "  Left untouched:  {} (already present)",
                stats.skipped_existing.len()
            );
        }
        if stats.unreachable > 0 {
            println!(
                "{} {} instance(s) not reachable from a root service were left out",
                "!".yellow().bold(),
                stats.unreachable
            );
        }
        Ok(())
    }
}
