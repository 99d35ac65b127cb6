//! Sync pipeline: health check, scan, plan, dispatch.

use std::path::{Path, PathBuf};

use serde::Serialize;

use rbxtree_core::{InstancePath, SyncConfig};
use rbxtree_fs::{find_source_root, scan, scan_file, ScanOptions, TreeError};

use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::{io_err, SyncError};
use crate::host::{HttpHost, MemoryHost, RemoteHost};
use crate::plan::plan;

/// What a run syncs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every instance below a source root.
    Tree { root: PathBuf, options: ScanOptions },
    /// One metadata or source file, sent as a single command.
    File(PathBuf),
}

impl SyncScope {
    /// A file path syncs that file; anything else is a tree root.
    pub fn detect(path: &Path, options: ScanOptions) -> Self {
        if path.is_file() {
            Self::File(path.to_path_buf())
        } else {
            Self::Tree {
                root: path.to_path_buf(),
                options,
            }
        }
    }
}

/// Everything a run did, for printing or `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub source_root: PathBuf,
    pub files_seen: usize,
    pub truncated: bool,
    /// Operations produced by the scan.
    pub scanned: usize,
    pub synthesized: Vec<InstancePath>,
    pub unresolved: Vec<InstancePath>,
    pub ambiguous_paths: Vec<InstancePath>,
    pub warnings: Vec<String>,
    pub dispatch: DispatchReport,
}

impl SyncSummary {
    fn new(source_root: PathBuf) -> Self {
        Self {
            source_root,
            files_seen: 0,
            truncated: false,
            scanned: 0,
            synthesized: Vec::new(),
            unresolved: Vec::new(),
            ambiguous_paths: Vec::new(),
            warnings: Vec::new(),
            dispatch: DispatchReport::empty(),
        }
    }

    /// No operation failed.
    pub fn is_clean(&self) -> bool {
        self.dispatch.failed == 0
    }
}

/// Run against the configured server, or an in-memory host for `dry_run`.
pub fn run(config: &SyncConfig, scope: SyncScope, dry_run: bool) -> Result<SyncSummary, SyncError> {
    if dry_run {
        tracing::info!("dry run: operations are applied to an in-memory host");
        run_on(MemoryHost::new(config.services.clone()), config, scope)
    } else {
        run_on(HttpHost::from_config(config), config, scope)
    }
}

/// Run against `host`.
pub fn run_on<H: RemoteHost>(
    host: H,
    config: &SyncConfig,
    scope: SyncScope,
) -> Result<SyncSummary, SyncError> {
    match scope {
        SyncScope::Tree { root, options } => sync_tree(host, config, &root, &options),
        SyncScope::File(file) => sync_file(host, config, &file),
    }
}

fn ensure_healthy<H: RemoteHost>(host: &mut H) -> Result<(), SyncError> {
    let url = host.location();
    let unreachable = |reason: String| SyncError::HostUnreachable { url, reason };
    match host.check_health() {
        Ok(reply) if reply.is_2xx() => Ok(()),
        Ok(reply) => Err(unreachable(format!("health check returned HTTP {}", reply.status))),
        Err(e) => Err(unreachable(e.to_string())),
    }
}

fn sync_tree<H: RemoteHost>(
    mut host: H,
    config: &SyncConfig,
    root: &Path,
    options: &ScanOptions,
) -> Result<SyncSummary, SyncError> {
    if !root.is_dir() {
        return Err(TreeError::MissingRoot {
            path: root.to_path_buf(),
        }
        .into());
    }
    ensure_healthy(&mut host)?;

    tracing::info!("collecting operations from {}", root.display());
    if let Some(scope) = &options.scope {
        tracing::info!("  filtering to service: {scope}");
    }
    if options.limit > 0 {
        tracing::info!("  limiting to {} operations", options.limit);
    }
    let report = scan(root, options)?;

    let mut summary = SyncSummary::new(root.to_path_buf());
    summary.files_seen = report.files_seen;
    summary.truncated = report.truncated;
    summary.scanned = report.operations.len();
    summary.ambiguous_paths = report.ambiguous_paths;
    summary.warnings = report.warnings.iter().map(ToString::to_string).collect();
    if report.operations.is_empty() {
        tracing::info!("no files to sync");
        return Ok(summary);
    }
    tracing::info!("found {} instance(s) to sync", report.operations.len());

    let plan = plan(report.operations, &config.services);
    summary.synthesized = plan.synthesized;
    summary.unresolved = plan.unresolved;

    let mut dispatcher = Dispatcher::new(host, config.batch_size)?;
    summary.dispatch = dispatcher.dispatch(&plan.operations);
    Ok(summary)
}

fn sync_file<H: RemoteHost>(
    mut host: H,
    config: &SyncConfig,
    file: &Path,
) -> Result<SyncSummary, SyncError> {
    std::fs::metadata(file).map_err(|e| io_err(file, e))?;
    let root = find_source_root(file).ok_or_else(|| SyncError::NoSourceRoot {
        path: file.to_path_buf(),
    })?;
    let op = scan_file(&root, file)?.ok_or_else(|| SyncError::NotSyncable {
        path: file.to_path_buf(),
    })?;
    ensure_healthy(&mut host)?;

    let mut summary = SyncSummary::new(root);
    summary.files_seen = 1;
    summary.scanned = 1;
    let mut dispatcher = Dispatcher::new(host, config.batch_size)?;
    summary.dispatch = dispatcher.send_single(&op);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::host::{Command, HostReply, ReplyBody, TransportError};

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    struct DownHost;

    impl RemoteHost for DownHost {
        fn location(&self) -> String {
            "http://127.0.0.1:9".to_string()
        }

        fn check_health(&mut self) -> Result<HostReply, TransportError> {
            Err(TransportError::Unreachable {
                url: self.location(),
                reason: "connection refused".to_string(),
            })
        }

        fn apply_batch(&mut self, _: &[rbxtree_core::Operation]) -> Result<HostReply, TransportError> {
            panic!("nothing may be sent after a failed health check");
        }

        fn run_command(&mut self, _: &Command) -> Result<HostReply, TransportError> {
            panic!("nothing may be sent after a failed health check");
        }
    }

    #[test]
    fn dry_run_tree_sync_applies_everything() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src, "Workspace/Map/Tree/Trunk.rbxjson", r#"{"className":"Part","name":"Trunk"}"#);
        write(&src, "ServerScriptService/Main.server.luau", "print(1)");

        let scope = SyncScope::detect(&src, ScanOptions::default());
        let summary = run(&SyncConfig::default(), scope, true).unwrap();

        assert_eq!(summary.scanned, 2);
        assert_eq!(
            summary.synthesized,
            vec![InstancePath::from("Workspace.Map"), InstancePath::from("Workspace.Map.Tree")]
        );
        assert_eq!(summary.dispatch.succeeded, 4);
        assert!(summary.is_clean());
    }

    #[test]
    fn failed_health_check_aborts_before_sending() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Workspace/A.rbxjson", "{}");

        let scope = SyncScope::detect(tmp.path(), ScanOptions::default());
        let err = run_on(DownHost, &SyncConfig::default(), scope).unwrap_err();
        assert!(matches!(err, SyncError::HostUnreachable { .. }), "got: {err}");
    }

    #[test]
    fn missing_root_is_fatal_before_health_check() {
        let tmp = TempDir::new().unwrap();
        let scope = SyncScope::Tree {
            root: tmp.path().join("src"),
            options: ScanOptions::default(),
        };
        let err = run_on(DownHost, &SyncConfig::default(), scope).unwrap_err();
        assert!(matches!(err, SyncError::Tree(TreeError::MissingRoot { .. })));
    }

    #[test]
    fn empty_tree_sends_nothing() {
        let tmp = TempDir::new().unwrap();
        let summary = run(
            &SyncConfig::default(),
            SyncScope::detect(tmp.path(), ScanOptions::default()),
            true,
        )
        .unwrap();
        assert_eq!(summary.scanned, 0);
        assert!(summary.dispatch.batches.is_empty());
    }

    #[test]
    fn single_file_sync_sends_one_command() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src, "ReplicatedStorage/Util.luau", "return {}");
        let file = src.join("ReplicatedStorage/Util.luau");

        let scope = SyncScope::detect(&file, ScanOptions::default());
        assert_eq!(scope, SyncScope::File(file.clone()));
        let summary = run(&SyncConfig::default(), scope, true).unwrap();
        assert_eq!(summary.source_root, src);
        assert_eq!(summary.dispatch.succeeded, 1);
    }

    #[test]
    fn single_file_outside_src_is_an_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Workspace/A.rbxjson", "{}");
        let err = run(
            &SyncConfig::default(),
            SyncScope::File(tmp.path().join("Workspace/A.rbxjson")),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::NoSourceRoot { .. }));
    }

    #[test]
    fn single_file_of_unknown_type_is_not_syncable() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src, "Workspace/readme.txt", "hi");
        let err = run(
            &SyncConfig::default(),
            SyncScope::File(src.join("Workspace/readme.txt")),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::NotSyncable { .. }));
    }

    #[test]
    fn health_reply_with_error_status_is_fatal() {
        struct Sick;
        impl RemoteHost for Sick {
            fn location(&self) -> String {
                "sick".to_string()
            }
            fn check_health(&mut self) -> Result<HostReply, TransportError> {
                Ok(HostReply {
                    status: 503,
                    body: ReplyBody::default(),
                })
            }
            fn apply_batch(&mut self, _: &[rbxtree_core::Operation]) -> Result<HostReply, TransportError> {
                unreachable!()
            }
            fn run_command(&mut self, _: &Command) -> Result<HostReply, TransportError> {
                unreachable!()
            }
        }

        let tmp = TempDir::new().unwrap();
        let err = run_on(
            Sick,
            &SyncConfig::default(),
            SyncScope::detect(tmp.path(), ScanOptions::default()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("HTTP 503"));
    }
}
