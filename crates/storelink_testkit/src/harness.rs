//! A backend wired to an in-memory database, a job queue and recorded
//! remote responses.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use storelink_core::{BackendId, BindingId, Database, ExternalId, Transaction};
use storelink_engine::jobs::{InMemoryJobQueue, Job, JobFunctions, JobRunner, RunReport};
use storelink_engine::{
    BackendConfig, ConnectorRegistry, Environment, Recorded, Recorder, RetryConfig, SearchFilter,
    SyncContext, SyncResult,
};

/// Test harness for one backend.
///
/// Every remote call goes through [`TestBackend::recorder`]; calls without
/// a recorded response fail with a fatal transport error.
pub struct TestBackend {
    /// Local store.
    pub db: Database,
    /// Jobs scheduled so far.
    pub queue: InMemoryJobQueue,
    /// Recorded remote responses.
    pub recorder: Arc<Recorder>,
    /// Environment of the backend.
    pub env: Environment,
    runner: JobRunner,
}

impl TestBackend {
    /// Creates a harness. `registry` receives the recorder the adapters
    /// must answer from.
    pub fn new(config: BackendConfig, registry: impl FnOnce(&Arc<Recorder>) -> ConnectorRegistry) -> Self {
        let recorder = Recorder::new();
        let env = Environment::new(config, Arc::new(registry(&recorder)));
        let db = Database::open_in_memory();
        let runner = JobRunner::new(db.clone())
            .with_environment(env.clone())
            .with_retry(RetryConfig::no_retry());
        Self {
            db,
            queue: InMemoryJobQueue::new(),
            recorder,
            env,
            runner,
        }
    }

    /// Replaces the job functions.
    pub fn with_functions(mut self, functions: JobFunctions) -> Self {
        self.runner = self.runner.with_functions(functions);
        self
    }

    /// Replaces the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.runner = self.runner.with_retry(retry);
        self
    }

    /// Returns the backend id.
    pub fn backend_id(&self) -> BackendId {
        self.env.backend_id()
    }

    /// Records the answer to `read` of `id` on `resource`.
    pub fn remote_record(&self, resource: &str, id: i64, record: Value) {
        let id = ExternalId::Int(id);
        self.recorder
            .respond(resource, "read", json!({ "id": id }), Recorded::Ok(record));
    }

    /// Records the ids returned by a search on `resource`.
    pub fn remote_search(&self, resource: &str, filter: &SearchFilter, ids: &[i64]) {
        self.recorder
            .respond(resource, "search", filter_args(filter), Recorded::Ok(json!(ids)));
    }

    /// Records the records returned by a `search_read` on `resource`.
    pub fn remote_search_read(&self, resource: &str, filter: &SearchFilter, records: Value) {
        self.recorder
            .respond(resource, "search_read", filter_args(filter), Recorded::Ok(records));
    }

    /// Records any answer.
    pub fn respond(&self, resource: &str, method: &str, args: Value, response: Recorded) {
        self.recorder.respond(resource, method, args, response);
    }

    /// Runs a job function right away, in its own transaction.
    pub fn call(&self, function: &str, args: Value) -> SyncResult<Option<String>> {
        self.runner.call(&self.queue, self.backend_id(), function, &args)
    }

    /// Imports one remote record.
    pub fn import(&self, model: &str, id: i64, force: bool) -> SyncResult<Option<String>> {
        let id = ExternalId::Int(id);
        self.call(
            "import_record",
            json!({ "model": model, "external_id": id, "force": force }),
        )
    }

    /// Runs a batch import.
    pub fn import_batch(&self, model: &str, filter: &SearchFilter) -> SyncResult<Option<String>> {
        self.call("import_batch", json!({ "model": model, "filter": filter }))
    }

    /// Exports a binding.
    pub fn export(&self, model: &str, binding_id: BindingId, fields: Option<&[&str]>) -> SyncResult<Option<String>> {
        self.call(
            "export_record",
            json!({ "model": model, "binding_id": binding_id, "fields": fields }),
        )
    }

    /// Runs `f` in a transaction with a context of this backend, then
    /// delivers the writes to the listeners and commits.
    ///
    /// This is how tests simulate local users editing records.
    pub fn local<T>(&self, f: impl FnOnce(&mut SyncContext<'_>) -> SyncResult<T>) -> SyncResult<T> {
        self.db.transaction(|txn: &mut Transaction| {
            let mut ctx = SyncContext::new(&self.env, txn, &self.queue);
            let value = f(&mut ctx)?;
            ctx.dispatch_write_events()?;
            Ok(value)
        })
    }

    /// Runs every due job, including the jobs they schedule.
    pub fn run_jobs(&self) -> RunReport {
        self.runner.run_pending(&self.queue, later())
    }

    /// Jobs of one function, in scheduling order.
    pub fn jobs_for(&self, function: &str) -> Vec<Job> {
        self.queue.jobs_for(function)
    }

    /// Jobs of one function on one model.
    pub fn jobs_for_model(&self, function: &str, model: &str) -> Vec<Job> {
        self.jobs_for(function)
            .into_iter()
            .filter(|job| job.model() == Some(model))
            .collect()
    }
}

/// Arguments a recording adapter sends for a search.
pub fn filter_args(filter: &SearchFilter) -> Value {
    serde_json::to_value(filter).unwrap_or(Value::Null)
}

/// A moment after every job scheduled so far.
pub fn later() -> DateTime<Utc> {
    Utc::now() + Duration::minutes(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use storelink_core::{values, BindingModel, RecordStore, WriteContext};
    use storelink_engine::{
        BackendKey, ImportHooks, ImportMapper, ModelBatchImporter, RecordingAdapter,
    };

    struct GroupImporter(ImportMapper);

    impl ImportHooks for GroupImporter {
        fn model(&self) -> &str {
            "test.group"
        }

        fn mapper(&self) -> &ImportMapper {
            &self.0
        }
    }

    fn backend() -> TestBackend {
        TestBackend::new(BackendConfig::default(), |recorder| {
            let key = BackendKey::new("shopware");
            let mut registry = ConnectorRegistry::new();
            registry
                .register_binding_model(BindingModel::wrapping("test.group", "res.group"))
                .register_adapter(
                    &key,
                    "test.group",
                    Arc::new(RecordingAdapter::new("groups", Arc::clone(recorder))),
                )
                .register_importer(
                    &key,
                    Arc::new(GroupImporter(ImportMapper::new("test.group").direct("name", "name"))),
                )
                .register_batch_importer(&key, Arc::new(ModelBatchImporter::deferred("test.group")));
            registry
        })
    }

    #[test]
    fn batch_then_jobs() {
        let backend = backend();
        backend.remote_search("groups", &SearchFilter::new(), &[1, 2]);
        backend.remote_record("groups", 1, json!({"id": 1, "name": "Retail"}));
        backend.remote_record("groups", 2, json!({"id": 2, "name": "Wholesale"}));

        backend.import_batch("test.group", &SearchFilter::new()).unwrap();
        assert_eq!(backend.jobs_for_model("import_record", "test.group").len(), 2);

        let report = backend.run_jobs();
        assert_eq!(report.done, 2);
        let names: Vec<String> = backend
            .db
            .records("res.group")
            .iter()
            .filter_map(|r| values::get_str(&r.values, "name").map(str::to_string))
            .collect();
        assert_eq!(names, vec!["Retail", "Wholesale"]);
    }

    #[test]
    fn local_writes_commit() {
        let backend = backend();
        let id = backend
            .local(|ctx| {
                let values = values::object(json!({"name": "Local"}));
                Ok(ctx.session.create("res.group", values, WriteContext::default())?)
            })
            .unwrap();
        assert!(backend.db.browse("res.group", id).is_some());
    }
}
