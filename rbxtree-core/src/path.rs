//! Filesystem path <-> dotted instance path mapping.
//!
//! # Layout
//!
//! ```text
//! src/
//!   Workspace/
//!     _meta.rbxjson          container metadata (path = Workspace)
//!     Model/
//!       _meta.rbxjson        (path = Workspace.Model)
//!       Part.rbxjson         leaf (path = Workspace.Model.Part)
//!       Part_1.rbxjson       second sibling named Part
//!     Main.server.luau       source text (path = Workspace.Main)
//!     Main.rbxjson           its metadata
//! ```
//!
//! [`resolve`] and [`encode`] are inverses over filesystem segments. Mapping
//! segments back to instance names (undoing sanitization and `_n`
//! disambiguation) needs the metadata contents and is done by the scanner.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::error::ResolveError;
use crate::types::ScriptKind;

/// Extension shared by every metadata file.
pub const META_EXTENSION: &str = ".rbxjson";

/// File name of a container's own metadata.
pub const CONTAINER_META_FILE: &str = "_meta.rbxjson";

const CONTAINER_META_STEM: &str = "_meta";
/// Leaves room for `_<n>` and the longest suffix under the common 255-byte
/// file name limit.
const MAX_NAME_BYTES: usize = 200;
const FALLBACK_NAME: &str = "unnamed";
/// Stem endings that would merge with a `.luau` suffix into a different kind.
const SCRIPT_MARKERS: [&str; 2] = [".server", ".client"];

/// What a file contributes to its instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    /// `_meta.rbxjson`; describes the enclosing directory.
    ContainerMeta,
    /// `<stem>.rbxjson`.
    InstanceMeta,
    /// `<stem>.server.luau`, `<stem>.client.luau` or `<stem>.luau`.
    Source(ScriptKind),
}

/// A file mapped onto filesystem segments below the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Directory names and the file stem, root-relative.
    pub segments: Vec<String>,
    pub role: FileRole,
}

impl ResolvedPath {
    /// Segments joined with `.`; the dotted path when no name differs from
    /// its filesystem stem.
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

/// Classify a bare file name: `(stem, role)`.
///
/// The stem of a container metadata file is empty.
pub fn classify(file_name: &str) -> Option<(&str, FileRole)> {
    if file_name == CONTAINER_META_FILE {
        return Some(("", FileRole::ContainerMeta));
    }
    if let Some(stem) = file_name.strip_suffix(META_EXTENSION) {
        return (!stem.is_empty()).then_some((stem, FileRole::InstanceMeta));
    }
    ScriptKind::strip_suffix(file_name).map(|(stem, kind)| (stem, FileRole::Source(kind)))
}

/// Map `file` (below `root`) to its filesystem segments and role.
pub fn resolve(root: &Path, file: &Path) -> Result<ResolvedPath, ResolveError> {
    let relative = file
        .strip_prefix(root)
        .map_err(|_| ResolveError::OutsideRoot {
            path: file.to_path_buf(),
            root: root.to_path_buf(),
        })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| ResolveError::NonUtf8 {
                    path: file.to_path_buf(),
                })?;
                parts.push(part.to_string());
            }
            Component::CurDir => {}
            _ => {
                return Err(ResolveError::OutsideRoot {
                    path: file.to_path_buf(),
                    root: root.to_path_buf(),
                })
            }
        }
    }

    let file_name = parts.pop().ok_or_else(|| ResolveError::Empty {
        path: file.to_path_buf(),
    })?;
    let (stem, role) = classify(&file_name).ok_or_else(|| ResolveError::Unrecognized {
        path: file.to_path_buf(),
    })?;

    if role != FileRole::ContainerMeta {
        parts.push(stem.to_string());
    }
    if parts.is_empty() {
        return Err(ResolveError::Empty {
            path: file.to_path_buf(),
        });
    }
    Ok(ResolvedPath {
        segments: parts,
        role,
    })
}

/// Root-relative file path for an entry: inverse of [`resolve`].
///
/// `segments` includes the instance's own stem as the last element. For
/// [`FileRole::ContainerMeta`] the stem names the directory. Stems must come
/// from [`sanitize_name`]: a raw `Net.client` module stem would encode to
/// `Net.client.luau` and resolve as a client script.
pub fn encode(segments: &[String], role: FileRole) -> PathBuf {
    let mut path = PathBuf::new();
    let Some((stem, dirs)) = segments.split_last() else {
        return path;
    };
    for dir in dirs {
        path.push(dir);
    }
    match role {
        FileRole::ContainerMeta => {
            path.push(stem);
            path.push(CONTAINER_META_FILE);
        }
        FileRole::InstanceMeta => path.push(format!("{stem}{META_EXTENSION}")),
        FileRole::Source(kind) => path.push(format!("{stem}{}", kind.suffix())),
    }
    path
}

/// Make an instance name safe to use as a file name.
///
/// Besides replacing reserved characters, the result is capped at
/// 200 bytes on a character boundary, and a trailing
/// `.server` / `.client` has its dot replaced so every suffix reads back as
/// the kind that wrote it.
pub fn sanitize_name(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    truncate_bytes(&mut cleaned, MAX_NAME_BYTES);
    let marker_len = SCRIPT_MARKERS
        .iter()
        .find(|marker| cleaned.ends_with(**marker))
        .map(|marker| marker.len());
    if let Some(len) = marker_len {
        let dot = cleaned.len() - len;
        cleaned.replace_range(dot..dot + 1, "_");
    }
    match cleaned.as_str() {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        _ => cleaned,
    }
}

fn truncate_bytes(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

/// Per-directory stem allocation table.
///
/// Each instance claims one stem shared by all of its entries (metadata
/// file, source file, child directory). Colliding names get `_1`, `_2`, …
/// in claim order. `_meta` is reserved for container metadata.
///
/// Collisions are checked case-insensitively (`Part` and `part` are the same
/// file on macOS and Windows); the returned stem keeps the name's own case.
#[derive(Debug, Clone)]
pub struct NameAllocator {
    taken: HashSet<String>,
}

impl Default for NameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl NameAllocator {
    pub fn new() -> Self {
        let mut taken = HashSet::new();
        taken.insert(CONTAINER_META_STEM.to_string());
        Self { taken }
    }

    /// Claim a unique stem for `name` (sanitized first).
    pub fn claim(&mut self, name: &str) -> String {
        let base = sanitize_name(name);
        if self.taken.insert(base.to_lowercase()) {
            return base;
        }
        let mut counter = 1usize;
        loop {
            let candidate = format!("{base}_{counter}");
            if self.taken.insert(candidate.to_lowercase()) {
                return candidate;
            }
            counter += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.taken.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn segs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case("Workspace/_meta.rbxjson", &["Workspace"], FileRole::ContainerMeta)]
    #[case("Workspace/Model/_meta.rbxjson", &["Workspace", "Model"], FileRole::ContainerMeta)]
    #[case("Workspace/Model/Part.rbxjson", &["Workspace", "Model", "Part"], FileRole::InstanceMeta)]
    #[case("Workspace/Main.server.luau", &["Workspace", "Main"], FileRole::Source(ScriptKind::Server))]
    #[case("StarterGui/Hud.client.luau", &["StarterGui", "Hud"], FileRole::Source(ScriptKind::Client))]
    #[case("ReplicatedStorage/Util.luau", &["ReplicatedStorage", "Util"], FileRole::Source(ScriptKind::Module))]
    fn resolve_cases(#[case] rel: &str, #[case] expected: &[&str], #[case] role: FileRole) {
        let root = Path::new("/project/src");
        let resolved = resolve(root, &root.join(rel)).expect("resolve");
        assert_eq!(resolved.segments, segs(expected));
        assert_eq!(resolved.role, role);
    }

    #[rstest]
    #[case(FileRole::ContainerMeta)]
    #[case(FileRole::InstanceMeta)]
    #[case(FileRole::Source(ScriptKind::Server))]
    #[case(FileRole::Source(ScriptKind::Client))]
    #[case(FileRole::Source(ScriptKind::Module))]
    fn encode_then_resolve_is_identity(#[case] role: FileRole) {
        let root = Path::new("/src");
        let segments = segs(&["Workspace", "Model_1", "Thing"]);
        let encoded = encode(&segments, role);
        let resolved = resolve(root, &root.join(encoded)).expect("resolve");
        assert_eq!(resolved.segments, segments);
        assert_eq!(resolved.role, role);
    }

    #[test]
    fn resolve_rejects_foreign_files() {
        let root = Path::new("/src");
        assert!(matches!(
            resolve(root, Path::new("/src/Workspace/readme.txt")),
            Err(ResolveError::Unrecognized { .. })
        ));
        assert!(matches!(
            resolve(root, Path::new("/elsewhere/Part.rbxjson")),
            Err(ResolveError::OutsideRoot { .. })
        ));
        assert!(matches!(
            resolve(root, Path::new("/src/_meta.rbxjson")),
            Err(ResolveError::Empty { .. })
        ));
    }

    #[test]
    fn dotted_joins_segments() {
        let resolved = resolve(Path::new("/s"), Path::new("/s/A/B/C.rbxjson")).unwrap();
        assert_eq!(resolved.dotted(), "A.B.C");
    }

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_name("normal_name"), "normal_name");
        assert_eq!(sanitize_name("file<>:name"), "file___name");
        assert_eq!(sanitize_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_name("tab\there"), "tab_here");
        assert_eq!(sanitize_name(""), "unnamed");
        assert_eq!(sanitize_name(".."), "unnamed");
        assert_eq!(sanitize_name(&"x".repeat(300)).len(), 200);
    }

    #[test]
    fn sanitize_caps_by_bytes_on_char_boundary() {
        let name = "界".repeat(200);
        let stem = sanitize_name(&name);
        assert_eq!(stem, "界".repeat(66));
        assert!(format!("{stem}_10{}", ScriptKind::Server.suffix()).len() <= 255);
    }

    #[rstest]
    #[case("Net.client", "Net_client")]
    #[case("Boot.server", "Boot_server")]
    #[case(".server", "_server")]
    #[case("Net.clients", "Net.clients")]
    #[case("client", "client")]
    fn sanitize_escapes_script_markers(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(sanitize_name(name), expected);
    }

    #[rstest]
    #[case("Net.client", FileRole::Source(ScriptKind::Module))]
    #[case("Boot.server", FileRole::Source(ScriptKind::Module))]
    #[case("Net.client", FileRole::InstanceMeta)]
    #[case("Boot.server", FileRole::Source(ScriptKind::Client))]
    fn encode_then_resolve_keeps_marker_names(#[case] name: &str, #[case] role: FileRole) {
        let root = Path::new("/src");
        let segments = vec!["ReplicatedStorage".to_string(), sanitize_name(name)];
        let encoded = encode(&segments, role);
        let resolved = resolve(root, &root.join(encoded)).expect("resolve");
        assert_eq!(resolved.segments, segments);
        assert_eq!(resolved.role, role);
    }

    #[test]
    fn allocator_suffixes_collisions_in_claim_order() {
        let mut names = NameAllocator::new();
        assert_eq!(names.claim("Part"), "Part");
        assert_eq!(names.claim("Part"), "Part_1");
        assert_eq!(names.claim("Part"), "Part_2");
        assert_eq!(names.claim("Part_1"), "Part_1_1");
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn allocator_collisions_ignore_case() {
        let mut names = NameAllocator::new();
        assert_eq!(names.claim("Part"), "Part");
        assert_eq!(names.claim("part"), "part_1");
        assert_eq!(names.claim("PART_1"), "PART_1_1");
        assert_eq!(names.claim("_META"), "_META_1");
    }

    #[test]
    fn allocator_reserves_container_meta_stem() {
        let mut names = NameAllocator::new();
        assert!(names.is_empty());
        assert_eq!(names.claim("_meta"), "_meta_1");
    }
}
