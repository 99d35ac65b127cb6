//! Tree materializer: instance graph -> directory tree.
//!
//! Runs in two phases. [`plan_layout`] walks the graph and allocates every
//! file and directory name up front, one [`NameAllocator`] per directory, with
//! no filesystem access. [`write_layout`] then creates the entries, never
//! replacing anything already on disk.
//!
//! Encoding per instance (`<stem>` = sanitized, disambiguated name):
//!
//! | instance                      | entries                                               |
//! |-------------------------------|-------------------------------------------------------|
//! | executable source             | `<stem><suffix>`, `<stem>.rbxjson`, `<stem>/` if children |
//! | other, with children          | `<stem>/_meta.rbxjson`, children inside `<stem>/`     |
//! | other, leaf                   | `<stem>.rbxjson`                                      |

use std::path::{Path, PathBuf};

use rbxtree_core::{
    path::{encode, FileRole, NameAllocator},
    InstanceGraph, ServiceSet,
};

use crate::consolidate::Dataset;
use crate::error::{io_err, json_err, TreeError, Warning};
use crate::write::{write_new, WriteOutcome};

/// One file to create, relative to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub path: PathBuf,
    pub role: FileRole,
    pub contents: Vec<u8>,
}

/// Every directory and file a materialization will create.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeLayout {
    /// Relative directories, parents before children.
    pub dirs: Vec<PathBuf>,
    pub files: Vec<PlannedFile>,
    /// Instances with no path to a root service; not part of the layout.
    pub unreachable: usize,
}

/// What [`write_layout`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    pub roots: usize,
    pub dirs: usize,
    pub meta_files: usize,
    pub source_files: usize,
    pub skipped_existing: Vec<PathBuf>,
    pub unreachable: usize,
    pub warnings: Vec<Warning>,
}

/// Allocate the on-disk layout for every instance reachable from a root.
pub fn plan_layout(graph: &InstanceGraph<'_>) -> Result<TreeLayout, TreeError> {
    let mut layout = TreeLayout {
        unreachable: graph.unreachable_count(),
        ..TreeLayout::default()
    };
    let mut visited = vec![false; graph.instances().len()];
    let mut top = NameAllocator::new();
    for (index, _) in graph.roots() {
        place(graph, index, &[], &mut top, &mut visited, &mut layout)?;
    }
    Ok(layout)
}

fn place(
    graph: &InstanceGraph<'_>,
    index: usize,
    dir: &[String],
    names: &mut NameAllocator,
    visited: &mut [bool],
    layout: &mut TreeLayout,
) -> Result<(), TreeError> {
    if std::mem::replace(&mut visited[index], true) {
        return Ok(());
    }
    let inst = &graph.instances()[index];
    let stem = names.claim(&inst.name);
    let mut segments = dir.to_vec();
    segments.push(stem);
    let has_children = graph.has_children(index);

    let child_dir = if inst.is_executable_source() {
        if let Some(source) = &inst.source {
            let role = FileRole::Source(inst.script_kind());
            layout.files.push(PlannedFile {
                path: encode(&segments, role),
                role,
                contents: source.clone().into_bytes(),
            });
        }
        push_meta(layout, &segments, FileRole::InstanceMeta, inst)?;
        has_children
    } else if has_children {
        push_meta(layout, &segments, FileRole::ContainerMeta, inst)?;
        true
    } else {
        push_meta(layout, &segments, FileRole::InstanceMeta, inst)?;
        false
    };

    if child_dir {
        layout.dirs.push(segments.iter().collect());
        let mut inner = NameAllocator::new();
        for (child, _) in graph.children_of(index) {
            place(graph, child, &segments, &mut inner, visited, layout)?;
        }
    }
    Ok(())
}

fn push_meta(
    layout: &mut TreeLayout,
    segments: &[String],
    role: FileRole,
    inst: &rbxtree_core::Instance,
) -> Result<(), TreeError> {
    let path = encode(segments, role);
    let contents = serde_json::to_vec_pretty(&inst.to_meta()).map_err(|e| json_err(&path, e))?;
    layout.files.push(PlannedFile {
        path,
        role,
        contents,
    });
    Ok(())
}

/// Create the planned entries below `dest`.
///
/// `dest` must be creatable and writable; that is checked before anything
/// else is written. Later per-file failures are recorded as warnings.
pub fn write_layout(layout: &TreeLayout, dest: &Path) -> Result<MaterializeStats, TreeError> {
    ensure_writable(dest)?;

    let mut stats = MaterializeStats {
        unreachable: layout.unreachable,
        ..MaterializeStats::default()
    };
    for dir in &layout.dirs {
        let full = dest.join(dir);
        match std::fs::create_dir_all(&full) {
            Ok(()) => stats.dirs += 1,
            Err(e) => stats
                .warnings
                .push(Warning::new(full.display().to_string(), e)),
        }
    }
    for file in &layout.files {
        let full = dest.join(&file.path);
        match write_new(&full, &file.contents) {
            Ok(WriteOutcome::Written { .. }) => match file.role {
                FileRole::Source(_) => stats.source_files += 1,
                _ => stats.meta_files += 1,
            },
            Ok(WriteOutcome::SkippedExisting { path }) => stats.skipped_existing.push(path),
            Err(e) => stats
                .warnings
                .push(Warning::new(full.display().to_string(), e)),
        }
    }
    Ok(stats)
}

fn ensure_writable(dest: &Path) -> Result<(), TreeError> {
    std::fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;
    let probe = dest.join(".rbxtree.probe");
    std::fs::write(&probe, b"").map_err(|e| io_err(dest, e))?;
    std::fs::remove_file(&probe).map_err(|e| io_err(&probe, e))
}

/// Build the graph from `dataset`, plan and write it below `dest`.
pub fn materialize(
    dataset: &Dataset,
    services: &ServiceSet,
    dest: &Path,
) -> Result<MaterializeStats, TreeError> {
    let graph = InstanceGraph::build(&dataset.instances, services);
    tracing::info!(
        "{} instance(s), {} root service(s)",
        dataset.instances.len(),
        graph.root_count()
    );
    for lost in graph.unreachable().take(20) {
        tracing::warn!(
            "unreachable: {} '{}' (parent {:?})",
            lost.kind,
            lost.name,
            lost.parent_id
        );
    }
    let layout = plan_layout(&graph)?;
    let mut stats = write_layout(&layout, dest)?;
    stats.roots = graph.root_count();
    tracing::info!(
        "wrote {} dir(s), {} metadata file(s), {} source file(s) to {}",
        stats.dirs,
        stats.meta_files,
        stats.source_files,
        dest.display()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbxtree_core::Instance;

    fn paths(layout: &TreeLayout) -> Vec<String> {
        layout
            .files
            .iter()
            .map(|f| f.path.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn container_leaf_and_script_encodings() {
        let instances = vec![
            Instance::new("Workspace", "Workspace").with_id("ws"),
            Instance::new("Model", "House").with_id("m").with_parent("ws"),
            Instance::new("Part", "Door").with_parent("m"),
            Instance::new("Script", "Main")
                .with_id("s")
                .with_parent("ws")
                .with_source("print(1)"),
            Instance::new("ModuleScript", "Lib")
                .with_parent("s")
                .with_source("return {}"),
        ];
        let graph = InstanceGraph::build(&instances, &ServiceSet::default());
        let layout = plan_layout(&graph).unwrap();

        assert_eq!(
            paths(&layout),
            vec![
                "Workspace/_meta.rbxjson",
                "Workspace/House/_meta.rbxjson",
                "Workspace/House/Door.rbxjson",
                "Workspace/Main.server.luau",
                "Workspace/Main.rbxjson",
                "Workspace/Main/Lib.luau",
                "Workspace/Main/Lib.rbxjson",
            ]
        );
        assert_eq!(layout.dirs.len(), 3);
    }

    #[test]
    fn script_metadata_omits_source() {
        let instances = vec![
            Instance::new("ServerScriptService", "ServerScriptService").with_id("sss"),
            Instance::new("Script", "Boot")
                .with_parent("sss")
                .with_source("print('hi')"),
        ];
        let graph = InstanceGraph::build(&instances, &ServiceSet::default());
        let layout = plan_layout(&graph).unwrap();
        let meta = layout
            .files
            .iter()
            .find(|f| f.path.ends_with("Boot.rbxjson"))
            .expect("meta file");
        let value: serde_json::Value = serde_json::from_slice(&meta.contents).unwrap();
        assert!(value.get("source").is_none());
        assert_eq!(value["className"], "Script");
    }

    #[test]
    fn sibling_collisions_get_numeric_suffix() {
        let instances = vec![
            Instance::new("Workspace", "Workspace").with_id("ws"),
            Instance::new("Part", "Part").with_parent("ws"),
            Instance::new("Part", "Part").with_parent("ws"),
            Instance::new("Script", "Part").with_parent("ws").with_source(""),
        ];
        let graph = InstanceGraph::build(&instances, &ServiceSet::default());
        let layout = plan_layout(&graph).unwrap();
        assert_eq!(
            paths(&layout),
            vec![
                "Workspace/_meta.rbxjson",
                "Workspace/Part.rbxjson",
                "Workspace/Part_1.rbxjson",
                "Workspace/Part_2.server.luau",
                "Workspace/Part_2.rbxjson",
            ]
        );
    }

    #[test]
    fn unreachable_instances_are_counted_not_placed() {
        let instances = vec![
            Instance::new("Workspace", "Workspace").with_id("ws"),
            Instance::new("Part", "Lost").with_parent("nowhere"),
        ];
        let graph = InstanceGraph::build(&instances, &ServiceSet::default());
        let layout = plan_layout(&graph).unwrap();
        assert_eq!(layout.unreachable, 1);
        assert_eq!(paths(&layout), vec!["Workspace.rbxjson"]);
    }
}
