//! Job records and the requests that schedule them.

use crate::adapter::SearchFilter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use storelink_core::{BackendId, BindingId, ExternalId};
use uuid::Uuid;

/// Priority of jobs that do not ask for one.
pub const DEFAULT_PRIORITY: u32 = 10;

/// A job to be scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Name of the job function.
    pub function: String,
    /// Backend the job runs for.
    pub backend_id: BackendId,
    /// Function arguments.
    pub args: Value,
    /// Lower values run first.
    pub priority: u32,
    /// Earliest start, immediately when `None`.
    pub eta: Option<DateTime<Utc>>,
}

impl JobRequest {
    /// Creates a request with the default priority.
    pub fn new(function: impl Into<String>, backend_id: BackendId, args: Value) -> Self {
        Self {
            function: function.into(),
            backend_id,
            args,
            priority: DEFAULT_PRIORITY,
            eta: None,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the earliest start.
    pub fn with_eta(mut self, eta: DateTime<Utc>) -> Self {
        self.eta = Some(eta);
        self
    }

    /// Imports one remote record.
    pub fn import_record(backend_id: BackendId, model: &str, external_id: &ExternalId, force: bool) -> Self {
        Self::new(
            "import_record",
            backend_id,
            json!({ "model": model, "external_id": external_id, "force": force }),
        )
    }

    /// Imports a batch of remote records.
    pub fn import_batch(backend_id: BackendId, model: &str, filter: &SearchFilter) -> Self {
        Self::new(
            "import_batch",
            backend_id,
            json!({ "model": model, "filter": filter }),
        )
    }

    /// Exports one binding, optionally restricted to some fields.
    pub fn export_record(backend_id: BackendId, model: &str, binding_id: BindingId, fields: Option<&[&str]>) -> Self {
        Self::new(
            "export_record",
            backend_id,
            json!({ "model": model, "binding_id": binding_id, "fields": fields }),
        )
    }

    /// Deletes one remote record.
    pub fn export_delete_record(backend_id: BackendId, model: &str, external_id: &ExternalId) -> Self {
        Self::new(
            "export_delete_record",
            backend_id,
            json!({ "model": model, "external_id": external_id }),
        )
    }
}

/// State of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to run.
    Pending,
    /// Taken by a runner.
    Started,
    /// Finished, with an optional result message.
    Done(Option<String>),
    /// Gave up; needs an operator.
    Failed(String),
}

/// A scheduled job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job id.
    pub id: Uuid,
    /// Name of the job function.
    pub function: String,
    /// Backend the job runs for.
    pub backend_id: BackendId,
    /// Function arguments.
    pub args: Value,
    /// Lower values run first.
    pub priority: u32,
    /// Earliest start.
    pub eta: DateTime<Utc>,
    /// Attempts so far.
    pub attempts: u32,
    /// Current state.
    pub state: JobState,
    /// Error of the last failed attempt.
    pub last_error: Option<String>,
}

impl Job {
    pub(crate) fn from_request(request: JobRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            function: request.function,
            backend_id: request.backend_id,
            args: request.args,
            priority: request.priority,
            eta: request.eta.unwrap_or(now),
            attempts: 0,
            state: JobState::Pending,
            last_error: None,
        }
    }

    /// Returns the `model` argument, if any.
    pub fn model(&self) -> Option<&str> {
        self.args.get("model").and_then(Value::as_str)
    }

    /// Returns true if the job is finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, JobState::Done(_) | JobState::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_requests() {
        let backend = BackendId::new(1);
        let import = JobRequest::import_record(backend, "shopware.res.partner", &ExternalId::Int(3), false);
        assert_eq!(import.function, "import_record");
        assert_eq!(import.priority, DEFAULT_PRIORITY);
        assert_eq!(
            import.args,
            json!({"model": "shopware.res.partner", "external_id": 3, "force": false})
        );

        let export = JobRequest::export_record(backend, "shopware.product.product", BindingId::new(4), Some(&["shopware_qty"][..]))
            .with_priority(20);
        assert_eq!(export.priority, 20);
        assert_eq!(export.args["fields"], json!(["shopware_qty"]));
        assert_eq!(export.args["binding_id"], json!(4));
    }

    #[test]
    fn job_from_request() {
        let now = Utc::now();
        let job = Job::from_request(
            JobRequest::export_delete_record(BackendId::new(1), "shopware.product.template", &ExternalId::Int(9)),
            now,
        );
        assert_eq!(job.eta, now);
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.model(), Some("shopware.product.template"));
        assert!(!job.is_finished());
    }
}
