//! # storelink engine
//!
//! Import/export synchronization engine for storelink connectors.
//!
//! This crate provides:
//! - Remote adapters (REST over an injectable HTTP client, recorded
//!   responses for tests and replays)
//! - A unit registry keyed by backend type, version and model
//! - Binders translating remote ids to local bindings
//! - Declarative import mappers
//! - The importer state machine and batch importers
//! - Exporters, deleters and write listeners
//! - Jobs: scheduling, priorities and retry with backoff
//!
//! ## Architecture
//!
//! Everything runs as a job. A job executes in one transaction of the local
//! store: a batch import searches remote ids and either imports them right
//! away or schedules one job per record; a record import maps the remote
//! record and writes it through its binding. Local writes are handed to
//! write listeners before the commit, which schedule exports.
//!
//! ## Key Invariants
//!
//! - A remote record is bound at most once per backend and model
//! - Imports never trigger exports of what they wrote
//! - A record is only imported when it changed since the last sync
//! - Two jobs never import the same remote record concurrently

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod batch;
mod binder;
pub mod checkpoint;
mod config;
mod deleter;
mod environment;
mod error;
mod exporter;
mod http;
mod importer;
pub mod jobs;
mod listener;
pub mod mapper;
mod registry;
pub mod watermark;

pub use adapter::{
    into_values, Adapter, Recorded, RecordedCall, RecordedResponse, Recorder, RecordingAdapter,
    SearchFilter,
};
pub use batch::{import_found, BatchImport, BatchMode, BatchReport, ModelBatchImporter};
pub use binder::{Binder, BoundRecord};
pub use config::{BackendConfig, RetryConfig, IMPORT_DELTA_BUFFER_SECS};
pub use deleter::Deleter;
pub use environment::{Environment, SyncContext};
pub use error::{SyncError, SyncResult};
pub use exporter::{ExportHooks, ExportOutcome, Exporter};
pub use http::{envelope, HttpClient, HttpMethod, HttpRequest, HttpResponse, RestAdapter};
pub use importer::{is_up_to_date, ImportHooks, ImportOutcome, Importer, RunOptions, SkipReason};
pub use listener::WriteListener;
pub use mapper::{ImportMapper, MapContext, MapOptions};
pub use registry::{BackendKey, ConnectorRegistry};

/// Version of the storelink engine crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
