//! `rbxtree consolidate`: merge extraction chunks into one dataset.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use rbxtree_core::DefaultDirs;
use rbxtree_fs::{consolidate_dir, TreeError, Warning};

/// Arguments for `rbxtree consolidate`.
#[derive(Args, Debug)]
pub struct ConsolidateArgs {
    /// Directory holding `chunk_*.json` (default: newest `~/rbxsync/.rbxsync/extract_*`).
    pub extract_dir: Option<PathBuf>,

    /// Where to write `game_data.json` and `class_index.json` (default: `~/rbxsync/output`).
    pub output_dir: Option<PathBuf>,

    /// Also dump every source text into `<OUTPUT_DIR>/scripts/`.
    #[arg(long)]
    pub extract_scripts: bool,

    /// How many kinds to list in the summary table.
    #[arg(long, default_value_t = 20)]
    pub top: usize,
}

#[derive(Tabled)]
struct KindRow {
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "count")]
    count: usize,
}

impl ConsolidateArgs {
    pub fn run(self) -> Result<()> {
        let dirs = DefaultDirs::from_home().context("could not determine home directory")?;
        let extract_dir = match self.extract_dir {
            Some(dir) => dir,
            None => {
                let latest = dirs.latest_extraction().with_context(|| {
                    format!(
                        "no extraction directories found under {}",
                        dirs.extractions().display()
                    )
                })?;
                println!("Using most recent extraction: {}", latest.display());
                latest
            }
        };
        let output_dir = self.output_dir.unwrap_or_else(|| dirs.consolidated());

        let result = consolidate_dir(&extract_dir)
            .with_context(|| format!("failed to read chunks from {}", extract_dir.display()))?;
        print_warnings(result.warnings());

        println!(
            "{} {} instance(s) from {} batch(es), {} unique id(s), {} kind(s)",
            "✓".green().bold(),
            result.total_instances(),
            result.batches_read(),
            result.index().unique_ids(),
            result.kind_counts().len(),
        );
        if self.top > 0 && result.total_instances() > 0 {
            let rows: Vec<KindRow> = result
                .index()
                .top_kinds(self.top)
                .into_iter()
                .map(|(kind, count)| KindRow {
                    kind: kind.to_string(),
                    count,
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }

        let writes = result
            .write_artifacts(&output_dir)
            .with_context(|| format!("cannot write to {}", output_dir.display()))?;
        print_artifact("dataset", &writes.dataset);
        print_artifact("kind index", &writes.kind_index);

        if self.extract_scripts {
            let dump = result
                .extract_scripts(&output_dir)
                .context("failed to extract scripts")?;
            println!(
                "  ✎  {} script(s) extracted{}",
                dump.written,
                skipped_suffix(dump.skipped_existing)
            );
        }

        if !writes.all_ok() {
            bail!("not every artifact was written to {}", output_dir.display());
        }
        Ok(())
    }
}

fn print_artifact(label: &str, outcome: &std::result::Result<PathBuf, TreeError>) {
    match outcome {
        Ok(path) => println!("  ✎  {label}: {}", display_with_size(path)),
        Err(e) => println!("  {}  {label}: {e}", "✗".red().bold()),
    }
}

fn display_with_size(path: &Path) -> String {
    match std::fs::metadata(path) {
        Ok(meta) => format!(
            "{} ({:.1} MB)",
            path.display(),
            meta.len() as f64 / 1024.0 / 1024.0
        ),
        Err(_) => path.display().to_string(),
    }
}

fn skipped_suffix(skipped: usize) -> String {
    if skipped == 0 {
        String::new()
    } else {
        format!(", {skipped} already present and left alone")
    }
}

pub(crate) fn print_warnings(warnings: &[Warning]) {
    if warnings.is_empty() {
        return;
    }
    println!(
        "{} {} source(s) skipped:",
        "!".yellow().bold(),
        warnings.len()
    );
    for warning in warnings.iter().take(10) {
        println!("  ·  {warning}");
    }
    if warnings.len() > 10 {
        println!("  ·  +{} more", warnings.len() - 10);
    }
}
