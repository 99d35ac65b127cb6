//! # rbxtree-fs
//!
//! Filesystem side of rbxtree:
//!
//! - [`consolidate`]: chunk batches into one canonical dataset
//! - [`materialize`]: dataset into a `src/` directory tree
//! - [`scan`]: directory tree back into update operations
//!
//! Per-file problems never abort a run; they surface as [`Warning`]s.

pub mod consolidate;
pub mod error;
pub mod materialize;
pub mod scan;
pub mod write;

pub use consolidate::{consolidate_dir, Consolidation, Consolidator, Dataset, DatasetRef};
pub use error::{TreeError, Warning};
pub use materialize::{materialize, plan_layout, write_layout, MaterializeStats, TreeLayout};
pub use scan::{find_source_root, scan, scan_file, ScanOptions, ScanReport};
