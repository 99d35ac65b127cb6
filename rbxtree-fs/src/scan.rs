//! Tree scanner: directory tree -> one update operation per instance.
//!
//! Files are merged through an explicit map keyed by their root-relative
//! stem (`Workspace/Model/Part`; a `_meta.rbxjson` is keyed by its
//! directory), last write wins. Metadata supplies everything except the
//! body text; a source file always supplies `source`.
//!
//! Dotted paths are built from instance names, not file names: each
//! segment takes the `name` recorded in the matching metadata and falls back
//! to the file or directory name. Siblings that share a name therefore share
//! a dotted path; they stay separate operations and are listed in
//! [`ScanReport::ambiguous_paths`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use rbxtree_core::{
    path::{self, FileRole, CONTAINER_META_FILE, META_EXTENSION},
    InstanceData, InstanceMeta, InstancePath, Operation, ResolveError, ScriptKind,
};

use crate::error::{TreeError, Warning};

/// Scan settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Restrict the walk to one top-level directory (a root service).
    pub scope: Option<String>,
    /// Stop once this many operations exist; `0` means no ceiling.
    pub limit: usize,
}

/// Result of a scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub operations: Vec<Operation>,
    pub files_seen: usize,
    /// The walk stopped at [`ScanOptions::limit`]; the set is incomplete.
    pub truncated: bool,
    /// Dotted paths produced by more than one operation.
    pub ambiguous_paths: Vec<InstancePath>,
    pub warnings: Vec<Warning>,
}

/// Walk `root` and build operations.
pub fn scan(root: &Path, options: &ScanOptions) -> Result<ScanReport, TreeError> {
    if !root.is_dir() {
        return Err(TreeError::MissingRoot {
            path: root.to_path_buf(),
        });
    }

    let mut scanner = Scanner::new(root);
    let walk_root = match &options.scope {
        Some(scope) => {
            let dir = root.join(scope);
            if !dir.is_dir() {
                scanner
                    .warnings
                    .push(Warning::new(scope.as_str(), "scope not found in source root"));
                return Ok(scanner.finish(0, false));
            }
            dir
        }
        None => root.to_path_buf(),
    };

    let mut files_seen = 0usize;
    let mut truncated = false;
    for entry in WalkDir::new(&walk_root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let at = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| walk_root.display().to_string());
                scanner.warnings.push(Warning::new(at, e));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        files_seen += 1;
        if files_seen % 1000 == 0 {
            tracing::info!(
                "  scanned {files_seen} files, {} operation(s)",
                scanner.entries.len()
            );
        }
        if scanner.ingest(entry.path(), options.limit) == Ingest::LimitReached {
            tracing::info!("reached limit of {} operation(s)", options.limit);
            truncated = true;
            break;
        }
    }

    Ok(scanner.finish(files_seen, truncated))
}

/// Build the single operation for `file` (metadata or source).
pub fn scan_file(root: &Path, file: &Path) -> Result<Option<Operation>, TreeError> {
    if !root.is_dir() {
        return Err(TreeError::MissingRoot {
            path: root.to_path_buf(),
        });
    }
    let mut scanner = Scanner::new(root);
    scanner.ingest(file, 0);
    if let Ok(resolved) = path::resolve(root, file) {
        if let FileRole::Source(_) = resolved.role {
            let meta = file.with_file_name(format!(
                "{}{META_EXTENSION}",
                resolved.segments.last().map(String::as_str).unwrap_or_default()
            ));
            if meta.is_file() {
                scanner.ingest(&meta, 0);
            }
        }
    }
    let report = scanner.finish(1, false);
    for warning in &report.warnings {
        tracing::debug!("{warning}");
    }
    Ok(report.operations.into_iter().next())
}

/// Nearest ancestor of `file` named `src`.
pub fn find_source_root(file: &Path) -> Option<PathBuf> {
    file.ancestors()
        .skip(1)
        .find(|dir| dir.file_name().map(|n| n == "src").unwrap_or(false))
        .map(Path::to_path_buf)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ingest {
    Added,
    Merged,
    Skipped,
    LimitReached,
}

#[derive(Debug)]
struct Entry {
    /// Root-relative filesystem segments, own stem last.
    segments: Vec<String>,
    data: InstanceData,
}

struct Scanner<'r> {
    root: &'r Path,
    entries: Vec<Entry>,
    by_key: HashMap<PathBuf, usize>,
    warnings: Vec<Warning>,
}

impl<'r> Scanner<'r> {
    fn new(root: &'r Path) -> Self {
        Self {
            root,
            entries: Vec::new(),
            by_key: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    fn ingest(&mut self, file: &Path, limit: usize) -> Ingest {
        let resolved = match path::resolve(self.root, file) {
            Ok(resolved) => resolved,
            Err(ResolveError::Unrecognized { .. }) => return Ingest::Skipped,
            Err(e) => {
                self.warnings
                    .push(Warning::new(file.display().to_string(), e));
                return Ingest::Skipped;
            }
        };
        let key: PathBuf = resolved.segments.iter().collect();
        let existing = self.by_key.get(&key).copied();
        if existing.is_none() && limit > 0 && self.entries.len() >= limit {
            return Ingest::LimitReached;
        }

        let update = match resolved.role {
            FileRole::ContainerMeta => self.read_meta(file).map(Update::Meta),
            FileRole::InstanceMeta => self.read_meta(file).map(|meta| {
                if existing.is_some() {
                    return Update::Meta(meta);
                }
                match self.companion_source(file, &resolved.segments) {
                    Some(source) => Update::MetaWithSource(meta, source),
                    None => Update::Meta(meta),
                }
            }),
            FileRole::Source(kind) => self
                .read_text(file)
                .map(|source| Update::Source(kind, source)),
        };
        let Some(update) = update else {
            return Ingest::Skipped;
        };

        match existing {
            Some(i) => {
                update.merge_into(&mut self.entries[i].data);
                Ingest::Merged
            }
            None => {
                let stem = resolved.segments.last().cloned().unwrap_or_default();
                let mut data = InstanceData::default();
                update.seed(&mut data, &stem);
                self.by_key.insert(key, self.entries.len());
                self.entries.push(Entry {
                    segments: resolved.segments,
                    data,
                });
                Ingest::Added
            }
        }
    }

    fn read_meta(&mut self, file: &Path) -> Option<InstanceMeta> {
        let text = self.read_text(file)?;
        match serde_json::from_str::<InstanceMeta>(&text) {
            Ok(meta) => Some(meta),
            Err(e) => {
                self.warnings.push(Warning::new(
                    file.display().to_string(),
                    format!("malformed metadata: {e}"),
                ));
                None
            }
        }
    }

    fn read_text(&mut self, file: &Path) -> Option<String> {
        match std::fs::read_to_string(file) {
            Ok(text) => Some(text),
            Err(e) => {
                self.warnings.push(Warning::new(
                    file.display().to_string(),
                    format!("could not read: {e}"),
                ));
                None
            }
        }
    }

    fn companion_source(&mut self, meta_file: &Path, segments: &[String]) -> Option<String> {
        let stem = segments.last()?;
        ScriptKind::ALL.iter().find_map(|kind| {
            let candidate = meta_file.with_file_name(format!("{stem}{}", kind.suffix()));
            candidate.is_file().then_some(candidate)
        })
        .and_then(|candidate| self.read_text(&candidate))
    }

    fn finish(self, files_seen: usize, truncated: bool) -> ScanReport {
        let mut dir_names: HashMap<PathBuf, String> = HashMap::new();
        let paths: Vec<InstancePath> = self
            .entries
            .iter()
            .map(|entry| self.instance_path(entry, &mut dir_names))
            .collect();

        let mut path_counts: BTreeMap<InstancePath, usize> = BTreeMap::new();
        for path in &paths {
            *path_counts.entry(path.clone()).or_insert(0) += 1;
        }
        let operations: Vec<Operation> = self
            .entries
            .into_iter()
            .zip(paths)
            .map(|(entry, path)| Operation::update(path, entry.data))
            .collect();

        let ambiguous_paths: Vec<InstancePath> = path_counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(p, _)| p)
            .collect();
        for path in &ambiguous_paths {
            tracing::warn!("{path}: several siblings share this name; the host sees one path");
        }

        ScanReport {
            operations,
            files_seen,
            truncated,
            ambiguous_paths,
            warnings: self.warnings,
        }
    }

    fn instance_path(&self, entry: &Entry, dir_names: &mut HashMap<PathBuf, String>) -> InstancePath {
        let mut names = Vec::with_capacity(entry.segments.len());
        let Some((own, dirs)) = entry.segments.split_last() else {
            return InstancePath::from_segments(&names);
        };
        let mut rel = PathBuf::new();
        for dir in dirs {
            rel.push(dir);
            names.push(self.dir_name(dir_names, &rel, dir));
        }
        names.push(
            entry
                .data
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| own.clone()),
        );
        InstancePath::from_segments(&names)
    }

    /// Instance name for the directory at `rel`.
    fn dir_name(&self, cache: &mut HashMap<PathBuf, String>, rel: &Path, fallback: &str) -> String {
        if let Some(name) = cache.get(rel) {
            return name.clone();
        }
        let name = self
            .by_key
            .get(rel)
            .and_then(|&i| self.entries.get(i))
            .and_then(|e| e.data.name.clone())
            .or_else(|| self.name_on_disk(rel))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| fallback.to_string());
        cache.insert(rel.to_path_buf(), name.clone());
        name
    }

    fn name_on_disk(&self, rel: &Path) -> Option<String> {
        let dir = self.root.join(rel);
        let sibling = dir
            .file_name()
            .map(|n| dir.with_file_name(format!("{}{META_EXTENSION}", n.to_string_lossy())));
        [Some(dir.join(CONTAINER_META_FILE)), sibling]
            .into_iter()
            .flatten()
            .find_map(|file| {
                let text = std::fs::read_to_string(file).ok()?;
                serde_json::from_str::<InstanceMeta>(&text).ok()?.name
            })
    }
}

/// What one file contributes to an entry.
enum Update {
    Meta(InstanceMeta),
    MetaWithSource(InstanceMeta, String),
    Source(ScriptKind, String),
}

impl Update {
    /// First file for a key.
    fn seed(self, data: &mut InstanceData, stem: &str) {
        match self {
            Update::Source(kind, source) => {
                data.kind = Some(kind.class_name().to_string());
                data.name = Some(stem.to_string());
                data.source = Some(source);
            }
            other => other.merge_into(data),
        }
    }

    /// Later file for an existing key; metadata replaces every field but
    /// `source`, source replaces only `source`.
    fn merge_into(self, data: &mut InstanceData) {
        match self {
            Update::Meta(meta) => {
                let source = data.source.take();
                *data = InstanceData::from(meta);
                data.source = source;
            }
            Update::MetaWithSource(meta, source) => {
                *data = InstanceData::from(meta);
                data.source = Some(source);
            }
            Update::Source(_, source) => data.source = Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn op_paths(report: &ScanReport) -> Vec<&str> {
        report.operations.iter().map(|o| o.path.as_str()).collect()
    }

    #[test]
    fn metadata_and_source_merge_into_one_operation() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "ServerScriptService/_meta.rbxjson", r#"{"className":"ServerScriptService","name":"ServerScriptService"}"#);
        write(root, "ServerScriptService/Main.rbxjson", r#"{"className":"Script","name":"Main","properties":{"Disabled":false}}"#);
        write(root, "ServerScriptService/Main.server.luau", "print('hi')");

        let report = scan(root, &ScanOptions::default()).unwrap();
        assert_eq!(op_paths(&report), vec!["ServerScriptService.Main", "ServerScriptService"]);
        let main = &report.operations[0];
        assert_eq!(main.data.kind.as_deref(), Some("Script"));
        assert_eq!(main.data.source.as_deref(), Some("print('hi')"));
        assert!(main.data.properties.is_some());
    }

    #[test]
    fn lone_source_file_synthesizes_kind_and_name() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "StarterGui/Hud.client.luau", "x()");
        write(tmp.path(), "ReplicatedStorage/Util.luau", "return {}");

        let report = scan(tmp.path(), &ScanOptions::default()).unwrap();
        let hud = report.operations.iter().find(|o| o.path.as_str() == "StarterGui.Hud").unwrap();
        assert_eq!(hud.data.kind.as_deref(), Some("LocalScript"));
        assert_eq!(hud.data.name.as_deref(), Some("Hud"));
        let util = report
            .operations
            .iter()
            .find(|o| o.path.as_str() == "ReplicatedStorage.Util")
            .unwrap();
        assert_eq!(util.data.kind.as_deref(), Some("ModuleScript"));
    }

    #[test]
    fn malformed_metadata_is_skipped_with_warning() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Workspace/Bad.rbxjson", "{ nope");
        write(tmp.path(), "Workspace/Good.rbxjson", r#"{"className":"Part","name":"Good"}"#);
        write(tmp.path(), "Workspace/notes.txt", "ignored");

        let report = scan(tmp.path(), &ScanOptions::default()).unwrap();
        assert_eq!(op_paths(&report), vec!["Workspace.Good"]);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.files_seen, 3);
    }

    #[test]
    fn limit_truncates_walk() {
        let tmp = TempDir::new().unwrap();
        for name in ["A", "B", "C", "D"] {
            write(tmp.path(), &format!("Workspace/{name}.rbxjson"), "{}");
        }
        let report = scan(
            tmp.path(),
            &ScanOptions {
                limit: 2,
                ..ScanOptions::default()
            },
        )
        .unwrap();
        assert!(report.truncated);
        assert_eq!(op_paths(&report), vec!["Workspace.A", "Workspace.B"]);
    }

    #[test]
    fn scope_restricts_walk_and_missing_scope_warns() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Workspace/A.rbxjson", "{}");
        write(tmp.path(), "Lighting/Sky.rbxjson", "{}");

        let scoped = ScanOptions {
            scope: Some("Lighting".to_string()),
            limit: 0,
        };
        let report = scan(tmp.path(), &scoped).unwrap();
        assert_eq!(op_paths(&report), vec!["Lighting.Sky"]);

        let missing = ScanOptions {
            scope: Some("Teams".to_string()),
            limit: 0,
        };
        let report = scan(tmp.path(), &missing).unwrap();
        assert!(report.operations.is_empty());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn directory_segments_use_recorded_names() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Workspace/a_b/_meta.rbxjson", r#"{"className":"Model","name":"a/b"}"#);
        write(tmp.path(), "Workspace/a_b/Part.rbxjson", r#"{"className":"Part","name":"Part"}"#);

        let report = scan(tmp.path(), &ScanOptions::default()).unwrap();
        let mut paths = op_paths(&report);
        paths.sort();
        assert_eq!(paths, vec!["Workspace.a/b", "Workspace.a/b.Part"]);
    }

    #[test]
    fn missing_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = scan(&tmp.path().join("nope"), &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, TreeError::MissingRoot { .. }));
    }

    #[test]
    fn scan_file_merges_companion_metadata() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src, "Workspace/Spin.rbxjson", r#"{"className":"Script","name":"Spin","properties":{"Disabled":true}}"#);
        write(&src, "Workspace/Spin.server.luau", "rotate()");

        let file = src.join("Workspace/Spin.server.luau");
        assert_eq!(find_source_root(&file), Some(src.clone()));
        let op = scan_file(&src, &file).unwrap().expect("operation");
        assert_eq!(op.path.as_str(), "Workspace.Spin");
        assert_eq!(op.data.source.as_deref(), Some("rotate()"));
        assert!(op.data.properties.is_some());
    }
}
