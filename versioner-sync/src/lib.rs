//! # versioner-sync
//!
//! Incremental export of catalog objects into the version-controlled tree.
//!
//! - [`store`]: hash-gated atomic content writes
//! - [`objects`]: per-object write/skip decisions for views and procedures
//! - [`jobs`]: the same policy at SQL Agent job granularity
//! - [`source`]: the [`CatalogSource`] seam to the database layer
//! - [`pipeline`]: iterates servers × databases and commits the watermark
//!
//! Call [`pipeline::run`] with a resolved [`versioner_core::RunConfig`].

pub mod diff;
pub mod error;
pub mod jobs;
pub mod objects;
pub mod outcome;
pub mod pipeline;
pub mod source;
pub mod store;

pub use error::SyncError;
pub use jobs::{group_jobs, reconcile_jobs, JobUnit};
pub use objects::{reconcile_objects, ObjectUnit};
pub use outcome::{Action, Entry, ReconcileOptions, ReconcileOutcome, SkipReason};
pub use pipeline::{run, RunSummary, UnitKind, UnitSummary, WatermarkUpdate};
pub use source::{CatalogSource, SnapshotSource, SourceError};
pub use store::{is_different, write_if_changed};
