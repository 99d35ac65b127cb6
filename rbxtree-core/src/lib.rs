//! rbxtree core library: domain types, indexes, path mapping, config.
//!
//! - [`types`]: instances, operations, newtypes
//! - [`index`]: [`RecordIndex`] over flat records
//! - [`graph`]: [`InstanceGraph`] and the root [`ServiceSet`]
//! - [`path`]: filesystem <-> dotted path resolution and name allocation
//! - [`config`]: [`SyncConfig`] loaded from `rbxtree.yaml`
//! - [`error`]: [`ConfigError`], [`ResolveError`]

pub mod config;
pub mod error;
pub mod graph;
pub mod index;
pub mod path;
pub mod types;

pub use config::{DefaultDirs, SyncConfig};
pub use error::{ConfigError, ResolveError};
pub use graph::{InstanceGraph, ServiceSet};
pub use index::RecordIndex;
pub use path::{FileRole, NameAllocator, ResolvedPath};
pub use types::{
    Instance, InstanceData, InstanceId, InstanceMeta, InstancePath, Operation, OperationKind,
    PropertyMap, ScriptKind,
};
