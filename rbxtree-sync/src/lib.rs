//! # rbxtree-sync
//!
//! Pushes a scanned directory tree to the remote host.
//!
//! [`plan()`] closes over missing ancestors and orders operations parent
//! before child; [`Dispatcher`] sends them in batches over a [`RemoteHost`];
//! [`pipeline::run`] strings scan, plan and dispatch together.

pub mod dispatch;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod plan;

pub use dispatch::{BatchOutcome, BatchReport, DispatchReport, Dispatcher};
pub use error::SyncError;
pub use host::{Command, HostReply, HostTimeouts, HttpHost, MemoryHost, RemoteHost, TransportError};
pub use pipeline::{run, run_on, SyncScope, SyncSummary};
pub use plan::{plan, Plan};
