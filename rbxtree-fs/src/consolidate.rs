//! Chunk consolidation: many extractor batches into one canonical dataset.
//!
//! Output artifacts (each committed on its own):
//!
//! ```text
//! <out>/
//!   game_data.json     { totalInstances, classCount, instances }
//!   class_index.json   { "<className>": count }
//!   scripts/           optional flat dump of every source text
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use rbxtree_core::{path::NameAllocator, Instance, RecordIndex};

use crate::error::{io_err, json_err, TreeError, Warning};
use crate::write::{write_atomic, write_new, WriteOutcome};

pub const DATASET_FILE: &str = "game_data.json";
pub const KIND_INDEX_FILE: &str = "class_index.json";
pub const SCRIPTS_DIR: &str = "scripts";

const CHUNK_PREFIX: &str = "chunk_";
const CHUNK_SUFFIX: &str = ".json";

/// Canonical dataset document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub total_instances: usize,
    pub class_count: usize,
    pub instances: Vec<Instance>,
}

/// Borrowed view of a [`Dataset`]; serializes the same document without
/// cloning the instance sequence.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRef<'a> {
    pub total_instances: usize,
    pub class_count: usize,
    pub instances: &'a [Instance],
}

impl Dataset {
    /// Read a dataset produced by [`Consolidation::write_artifacts`].
    pub fn load(path: &Path) -> Result<Self, TreeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_json::from_str(&contents).map_err(|e| json_err(path, e))
    }
}

/// List `chunk_*.json` files in producer order.
///
/// Chunks are ordered by their numeric index so `chunk_10` follows
/// `chunk_9`; names without a numeric index sort after, by name.
pub fn discover_chunks(dir: &Path) -> Result<Vec<PathBuf>, TreeError> {
    let mut chunks: Vec<(Option<u64>, String, PathBuf)> = std::fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            let index = name
                .strip_prefix(CHUNK_PREFIX)?
                .strip_suffix(CHUNK_SUFFIX)?
                .parse::<u64>()
                .ok();
            Some((index, name, e.path()))
        })
        .collect();
    chunks.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.1.cmp(&b.1)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    });
    Ok(chunks.into_iter().map(|(_, _, path)| path).collect())
}

/// Accumulates batches into a [`RecordIndex`].
#[derive(Debug, Default)]
pub struct Consolidator {
    index: RecordIndex,
    batches_read: usize,
    warnings: Vec<Warning>,
}

impl Consolidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one batch. A batch that is not a JSON array of instances is
    /// skipped as a whole and recorded as a warning.
    pub fn add_batch(&mut self, label: &str, text: &str) -> bool {
        match serde_json::from_str::<Vec<Instance>>(text) {
            Ok(instances) => {
                tracing::debug!("{label}: {} instance(s)", instances.len());
                self.index.extend(instances);
                self.batches_read += 1;
                true
            }
            Err(e) => {
                self.warnings
                    .push(Warning::new(label, format!("failed to parse batch: {e}")));
                false
            }
        }
    }

    /// Read and parse one batch file; unreadable files become warnings.
    pub fn add_file(&mut self, path: &Path) -> bool {
        let label = path.display().to_string();
        match std::fs::read_to_string(path) {
            Ok(text) => self.add_batch(&label, &text),
            Err(e) => {
                self.warnings
                    .push(Warning::new(label, format!("failed to read batch: {e}")));
                false
            }
        }
    }

    pub fn finish(self) -> Consolidation {
        tracing::info!(
            "consolidated {} instance(s) of {} kind(s) from {} batch(es)",
            self.index.len(),
            self.index.kind_count(),
            self.batches_read
        );
        Consolidation {
            index: self.index,
            batches_read: self.batches_read,
            warnings: self.warnings,
        }
    }
}

/// Read every chunk in `dir` in producer order.
pub fn consolidate_dir(dir: &Path) -> Result<Consolidation, TreeError> {
    let chunks = discover_chunks(dir)?;
    tracing::info!("reading {} chunk(s) from {}", chunks.len(), dir.display());
    let mut consolidator = Consolidator::new();
    for (i, chunk) in chunks.iter().enumerate() {
        consolidator.add_file(chunk);
        if (i + 1) % 1000 == 0 {
            tracing::info!("  read {}/{} chunks", i + 1, chunks.len());
        }
    }
    Ok(consolidator.finish())
}

/// Result of consolidation.
#[derive(Debug)]
pub struct Consolidation {
    index: RecordIndex,
    batches_read: usize,
    warnings: Vec<Warning>,
}

/// Per-artifact outcome of [`Consolidation::write_artifacts`].
#[derive(Debug)]
pub struct ArtifactWrites {
    pub dataset: Result<PathBuf, TreeError>,
    pub kind_index: Result<PathBuf, TreeError>,
}

impl ArtifactWrites {
    pub fn all_ok(&self) -> bool {
        self.dataset.is_ok() && self.kind_index.is_ok()
    }
}

/// Counts from [`Consolidation::extract_scripts`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScriptDump {
    pub written: usize,
    pub skipped_existing: usize,
}

impl Consolidation {
    pub fn index(&self) -> &RecordIndex {
        &self.index
    }

    pub fn total_instances(&self) -> usize {
        self.index.len()
    }

    pub fn kind_counts(&self) -> &BTreeMap<String, usize> {
        self.index.kind_counts()
    }

    pub fn batches_read(&self) -> usize {
        self.batches_read
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Canonical instance sequence, producer order, duplicates kept.
    pub fn instances(&self) -> &[Instance] {
        self.index.records()
    }

    pub fn dataset(&self) -> DatasetRef<'_> {
        DatasetRef {
            total_instances: self.index.len(),
            class_count: self.index.kind_count(),
            instances: self.index.records(),
        }
    }

    /// Write the dataset and the kind summary as two independent commits.
    ///
    /// A failure writing one artifact does not stop or roll back the other.
    pub fn write_artifacts(&self, out_dir: &Path) -> Result<ArtifactWrites, TreeError> {
        std::fs::create_dir_all(out_dir).map_err(|e| io_err(out_dir, e))?;

        let dataset_path = out_dir.join(DATASET_FILE);
        let dataset = serde_json::to_vec(&self.dataset())
            .map_err(|e| json_err(&dataset_path, e))
            .and_then(|bytes| write_atomic(&dataset_path, &bytes))
            .map(|()| dataset_path);
        if let Err(e) = &dataset {
            tracing::warn!("dataset not written: {e}");
        }

        let kinds_path = out_dir.join(KIND_INDEX_FILE);
        let kind_index = serde_json::to_vec_pretty(self.kind_counts())
            .map_err(|e| json_err(&kinds_path, e))
            .and_then(|bytes| write_atomic(&kinds_path, &bytes))
            .map(|()| kinds_path);
        if let Err(e) = &kind_index {
            tracing::warn!("kind index not written: {e}");
        }

        Ok(ArtifactWrites {
            dataset,
            kind_index,
        })
    }

    /// Dump every source text into a flat `scripts/` directory.
    pub fn extract_scripts(&self, out_dir: &Path) -> Result<ScriptDump, TreeError> {
        let dir = out_dir.join(SCRIPTS_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let mut names = NameAllocator::new();
        let mut dump = ScriptDump::default();
        for inst in self.index.records() {
            let Some(source) = inst.source.as_deref().filter(|s| !s.is_empty()) else {
                continue;
            };
            let stem = names.claim(&inst.name);
            let path = dir.join(format!("{stem}{}", inst.script_kind().suffix()));
            match write_new(&path, source.as_bytes())? {
                WriteOutcome::Written { .. } => dump.written += 1,
                WriteOutcome::SkippedExisting { .. } => dump.skipped_existing += 1,
            }
        }
        tracing::info!("extracted {} script(s) to {}", dump.written, dir.display());
        Ok(dump)
    }
}
