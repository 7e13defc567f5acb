//! Versioner core library: domain types, watermark persistence, errors.
//!
//! Public API surface:
//! - [`types`]: catalog rows, job records, source and object kinds
//! - [`timestamp`]: tolerant `modifiedAt` decoding to UTC
//! - [`watermark`]: per-source "last extracted" store
//! - [`paths`]: destination tree layout and filename sanitization
//! - [`config`]: config file and resolved [`RunConfig`]
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod error;
pub mod paths;
pub mod timestamp;
pub mod types;
pub mod watermark;

pub use config::{ConfigFile, DatabaseSelection, RunConfig, RunConfigBuilder};
pub use error::CoreError;
pub use timestamp::{parse_timestamp, parse_timestamp_str};
pub use types::{
    CatalogRow, JobId, JobRecord, JobStepRow, ObjectKind, RawTimestamp, SourceType, StepRecord,
};
