//! Runs due jobs in transactions and applies the retry policy.

use super::functions::JobFunctions;
use super::job::Job;
use super::queue::InMemoryJobQueue;
use crate::config::RetryConfig;
use crate::environment::{Environment, SyncContext};
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use storelink_core::{BackendId, Database};
use tracing::{info, warn};

/// Counts of a [`JobRunner::run_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Jobs finished successfully.
    pub done: usize,
    /// Jobs postponed after a retryable failure.
    pub postponed: usize,
    /// Jobs that gave up.
    pub failed: usize,
}

impl RunReport {
    /// Total number of attempts made.
    pub fn attempts(&self) -> usize {
        self.done + self.postponed + self.failed
    }
}

/// Executes queued jobs.
///
/// Each job runs in its own transaction. Write listeners run before the
/// commit, so exports triggered by an import are scheduled only if the
/// import succeeds. Jobs scheduled by a job that later fails are kept.
pub struct JobRunner {
    db: Database,
    environments: HashMap<BackendId, Environment>,
    functions: JobFunctions,
    retry: RetryConfig,
}

impl JobRunner {
    /// Creates a runner with the standard job functions.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            environments: HashMap::new(),
            functions: JobFunctions::standard(),
            retry: RetryConfig::default(),
        }
    }

    /// Adds a backend environment.
    pub fn with_environment(mut self, env: Environment) -> Self {
        self.environments.insert(env.backend_id(), env);
        self
    }

    /// Replaces the job functions.
    pub fn with_functions(mut self, functions: JobFunctions) -> Self {
        self.functions = functions;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Returns the environment of a backend.
    pub fn environment(&self, backend_id: BackendId) -> Option<&Environment> {
        self.environments.get(&backend_id)
    }

    /// Runs a job function immediately, outside the queue, in its own
    /// transaction. Follow-up jobs go to `queue`.
    pub fn call(
        &self,
        queue: &InMemoryJobQueue,
        backend_id: BackendId,
        function: &str,
        args: &serde_json::Value,
    ) -> SyncResult<Option<String>> {
        let env = self
            .environments
            .get(&backend_id)
            .ok_or_else(|| SyncError::failed(format!("unknown backend {backend_id}")))?;
        let function = self
            .functions
            .get(function)
            .ok_or_else(|| SyncError::failed(format!("unknown job function {function}")))?;
        self.db.transaction(|txn| {
            let mut ctx = SyncContext::new(env, txn, queue);
            let message = function(&mut ctx, args)?;
            ctx.dispatch_write_events()?;
            Ok(message)
        })
    }

    /// Runs the next job due at `now`. Returns `None` when none is due.
    pub fn run_next(&self, queue: &InMemoryJobQueue, now: DateTime<Utc>) -> Option<Job> {
        let job = queue.next_due(now)?;
        match self.call(queue, job.backend_id, &job.function, &job.args) {
            Ok(message) => {
                info!(id = %job.id, function = %job.function, ?message, "job done");
                queue.complete(job.id, message);
            }
            Err(err) if err.is_retryable() && self.retry.allows_retry(job.attempts) => {
                let delay = self.retry.delay_for_attempt(job.attempts);
                let eta = now + Duration::from_std(delay).unwrap_or_else(|_| Duration::zero());
                warn!(id = %job.id, function = %job.function, attempts = job.attempts, %err, %eta, "job postponed");
                queue.postpone(job.id, eta, err.to_string());
            }
            Err(err) => {
                warn!(id = %job.id, function = %job.function, attempts = job.attempts, %err, "job failed");
                queue.fail(job.id, err.to_string());
            }
        }
        queue.get(job.id)
    }

    /// Runs jobs until none is due at `now`.
    ///
    /// Jobs postponed with a zero delay run again in the same pass, until
    /// their retry budget is spent.
    pub fn run_pending(&self, queue: &InMemoryJobQueue, now: DateTime<Utc>) -> RunReport {
        let mut report = RunReport::default();
        while let Some(job) = self.run_next(queue, now) {
            match job.state {
                super::JobState::Done(_) => report.done += 1,
                super::JobState::Failed(_) => report.failed += 1,
                _ => report.postponed += 1,
            }
        }
        report
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("backends", &self.environments.keys().collect::<Vec<_>>())
            .field("functions", &self.functions)
            .field("retry", &self.retry)
            .finish()
    }
}
