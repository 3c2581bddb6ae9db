//! Jobs: deferred units of work.
//!
//! Imports and exports run as jobs. A job names a function, the backend it
//! runs for and JSON arguments. Jobs with a lower priority value run first;
//! each job runs in its own transaction and failed retryable jobs are
//! postponed with backoff.

mod functions;
mod job;
mod queue;
mod runner;

pub use functions::{
    DeleteRecordArgs, ExportRecordArgs, ImportBatchArgs, ImportRecordArgs, JobFn, JobFunctions,
};
pub use job::{Job, JobRequest, JobState, DEFAULT_PRIORITY};
pub use queue::InMemoryJobQueue;
pub use runner::{JobRunner, RunReport};

use uuid::Uuid;

/// Accepts jobs for later execution.
pub trait JobScheduler: Send + Sync {
    /// Enqueues a job and returns its id.
    fn schedule(&self, request: JobRequest) -> Uuid;
}
