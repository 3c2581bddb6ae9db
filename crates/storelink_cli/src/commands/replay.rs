//! Replaying a backend against a fixture file.

use super::CliError;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use storelink_core::{BackendId, Database, ExternalId};
use storelink_engine::jobs::{ImportRecordArgs, InMemoryJobQueue, JobRunner, JobState, RunReport};
use storelink_engine::{BackendConfig, RecordedResponse, Recorder, RetryConfig};
use storelink_shopware::backend;
use tracing::{debug, info};

/// Contents of a fixture file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    /// Backend configuration.
    pub backend: BackendConfig,
    /// Recorded remote responses.
    pub responses: Vec<RecordedResponse>,
    /// Records imported before the command runs.
    pub imports: Vec<FixtureImport>,
}

/// A record imported while preparing the replay.
#[derive(Debug, Serialize, Deserialize)]
pub struct FixtureImport {
    /// Binding model.
    pub model: String,
    /// Remote id.
    pub external_id: ExternalId,
}

impl Fixtures {
    /// Reads a fixture file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// A job that gave up during the replay.
#[derive(Debug, Serialize)]
pub struct JobFailure {
    /// Job function.
    pub function: String,
    /// Model the job worked on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Last error.
    pub error: String,
}

/// Outcome of a command.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// Job function the command called.
    pub function: String,
    /// Message returned by the function.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Jobs finished.
    pub jobs_done: usize,
    /// Jobs postponed for a retry.
    pub jobs_postponed: usize,
    /// Jobs that gave up.
    pub jobs_failed: usize,
    /// Details of the failed jobs.
    pub failures: Vec<JobFailure>,
    /// Bindings in the store afterwards.
    pub bindings: usize,
    /// Remote calls made by the command.
    pub remote_calls: usize,
    /// Remote create, write and delete calls.
    pub remote_writes: usize,
}

/// A Shopware backend answering from recorded responses, with an
/// in-memory store.
pub struct Replay {
    /// Local store.
    pub db: Database,
    queue: InMemoryJobQueue,
    recorder: Arc<Recorder>,
    runner: JobRunner,
    backend_id: BackendId,
}

impl Replay {
    /// Builds a replay and runs the fixture imports.
    pub fn new(fixtures: Fixtures) -> Result<Self, CliError> {
        let backend_id = fixtures.backend.backend_id;
        let recorder = Recorder::from_responses(fixtures.responses);
        let env = storelink_shopware::environment(fixtures.backend, &recorder);
        let db = Database::open_in_memory();
        let runner = JobRunner::new(db.clone())
            .with_environment(env)
            .with_functions(backend::functions())
            .with_retry(RetryConfig::no_retry());
        let replay = Self {
            db,
            queue: InMemoryJobQueue::new(),
            recorder,
            runner,
            backend_id,
        };

        for import in &fixtures.imports {
            debug!(model = %import.model, id = %import.external_id, "fixture import");
            let args = ImportRecordArgs {
                model: import.model.clone(),
                external_id: import.external_id.clone(),
                force: false,
            };
            replay
                .runner
                .call(&replay.queue, backend_id, "import_record", &serde_json::to_value(args)?)?;
        }
        replay.run_jobs();
        replay.recorder.clear_calls();
        Ok(replay)
    }

    /// Loads a fixture file and builds its replay.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        Self::new(Fixtures::load(path)?)
    }

    /// Returns the binding of a remote id.
    pub fn binding_of(&self, model: &str, external_id: &ExternalId) -> Option<storelink_core::Binding> {
        self.db
            .bindings_of(self.backend_id, model)
            .into_iter()
            .find(|b| b.external_id.as_ref() == Some(external_id))
    }

    /// Calls a job function, then runs every job it scheduled.
    pub fn run(&self, function: &str, args: Value) -> Result<RunSummary, CliError> {
        let message = self.runner.call(&self.queue, self.backend_id, function, &args)?;
        let report = self.run_jobs();
        info!(function, done = report.done, failed = report.failed, "replay finished");

        let failures = self
            .queue
            .jobs()
            .into_iter()
            .filter_map(|job| match &job.state {
                JobState::Failed(error) => Some(JobFailure {
                    function: job.function.clone(),
                    model: job.model().map(str::to_string),
                    error: error.clone(),
                }),
                _ => None,
            })
            .collect();
        Ok(RunSummary {
            function: function.to_string(),
            message,
            jobs_done: report.done,
            jobs_postponed: report.postponed,
            jobs_failed: report.failed,
            failures,
            bindings: self.db.binding_count(),
            remote_calls: self.recorder.calls().len(),
            remote_writes: self.recorder.mutation_count(),
        })
    }

    fn run_jobs(&self) -> RunReport {
        // jobs scheduled from here on are due right away
        self.runner
            .run_pending(&self.queue, Utc::now() + Duration::minutes(1))
    }
}
