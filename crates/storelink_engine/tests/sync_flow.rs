//! End-to-end tests of imports, exports and jobs against recorded remote
//! responses.

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use storelink_core::{
    values, BackendId, BindingModel, BindingStore, CoreError, Database, ExternalId, LockService,
    RecordStore, Values, WriteContext, WriteEvent,
};
use storelink_engine::jobs::{InMemoryJobQueue, JobRequest, JobRunner, JobScheduler, JobState};
use storelink_engine::{
    BackendConfig, BackendKey, BoundRecord, ConnectorRegistry, Environment, ExportHooks,
    ExportOutcome, ImportHooks, ImportMapper, ModelBatchImporter, Recorded, Recorder,
    RecordingAdapter, RetryConfig, SearchFilter, SyncContext, SyncError, SyncResult,
    WriteListener,
};

const GROUP: &str = "test.group";
const CUSTOMER: &str = "test.customer";

struct GroupImporter {
    mapper: ImportMapper,
}

impl ImportHooks for GroupImporter {
    fn model(&self) -> &str {
        GROUP
    }

    fn mapper(&self) -> &ImportMapper {
        &self.mapper
    }
}

/// Work run once, the next time an import checks the remote record's
/// freshness.
type Interleave = Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>;

struct CustomerImporter {
    mapper: ImportMapper,
    interleave: Interleave,
}

impl CustomerImporter {
    fn new(interleave: Interleave) -> Self {
        let mapper = ImportMapper::new(CUSTOMER)
            .direct("email", "email")
            .rule("group", |ctx, record| {
                let group = ctx.require_record(GROUP, record.get("groupId"))?;
                Ok(values::object(json!({ "group_id": group.map(|g| g.as_u64()) })))
            })
            .rule_on_create("customer", |_, _| Ok(values::object(json!({ "customer": true }))));
        Self { mapper, interleave }
    }
}

impl ImportHooks for CustomerImporter {
    fn model(&self) -> &str {
        CUSTOMER
    }

    fn mapper(&self) -> &ImportMapper {
        &self.mapper
    }

    fn changed_field(&self) -> Option<&str> {
        let pending = self.interleave.lock().unwrap().take();
        if let Some(work) = pending {
            work();
        }
        Some("changed")
    }

    fn import_dependencies(&self, ctx: &mut SyncContext<'_>, record: &Values) -> SyncResult<()> {
        ctx.import_dependency_value(record.get("groupId"), GROUP, false)
    }
}

struct CustomerExporter;

impl ExportHooks for CustomerExporter {
    fn model(&self) -> &str {
        CUSTOMER
    }

    fn payload(&self, _ctx: &mut SyncContext<'_>, bound: &BoundRecord, _fields: Option<&[String]>) -> SyncResult<Values> {
        Ok(values::object(json!({ "email": bound.get("email") })))
    }

    fn reconcile(&self, ctx: &mut SyncContext<'_>, bound: &BoundRecord) -> SyncResult<Option<ExternalId>> {
        let filter = SearchFilter::new().with_condition("email", bound.get("email").cloned().unwrap_or(Value::Null));
        let found = ctx.env.adapter(CUSTOMER)?.search_read(&filter)?;
        Ok(found.first().and_then(|r| r.get("id")).and_then(ExternalId::from_value))
    }
}

/// Schedules an export when a bound partner changes locally.
struct PartnerListener;

impl WriteListener for PartnerListener {
    fn on_write(&self, ctx: &mut SyncContext<'_>, event: &WriteEvent) -> SyncResult<()> {
        if event.context.no_export || !event.touches(&["email"]) {
            return Ok(());
        }
        let storelink_core::WriteTarget::Record(record_id) = event.target else {
            return Ok(());
        };
        let backend_id = ctx.backend_id();
        if let Some(binding) = ctx.session.find_binding_by_record(backend_id, CUSTOMER, record_id)? {
            ctx.schedule(JobRequest::export_record(backend_id, CUSTOMER, binding.id, Some(&["email"][..])));
        }
        Ok(())
    }
}

struct Harness {
    db: Database,
    queue: InMemoryJobQueue,
    recorder: Arc<Recorder>,
    runner: JobRunner,
    env: Environment,
    interleave: Interleave,
}

fn harness(retry: RetryConfig) -> Harness {
    let recorder = Recorder::new();
    let interleave = Interleave::default();
    let key = BackendKey::new("shopware");
    let mut registry = ConnectorRegistry::new();
    registry
        .register_binding_model(BindingModel::wrapping(GROUP, "res.group"))
        .register_binding_model(BindingModel::wrapping(CUSTOMER, "res.partner").one_per_record())
        .register_adapter(&key, GROUP, Arc::new(RecordingAdapter::new("groups", recorder.clone())))
        .register_adapter(&key, CUSTOMER, Arc::new(RecordingAdapter::new("customers", recorder.clone())))
        .register_importer(
            &key,
            Arc::new(GroupImporter {
                mapper: ImportMapper::new(GROUP).direct("name", "name"),
            }),
        )
        .register_importer(&key, Arc::new(CustomerImporter::new(interleave.clone())))
        .register_batch_importer(&key, Arc::new(ModelBatchImporter::deferred(CUSTOMER)))
        .register_exporter(&key, Arc::new(CustomerExporter))
        .register_listener(&key, "res.partner", Arc::new(PartnerListener));

    let env = Environment::new(
        BackendConfig::new(BackendId::new(1), "shopware", "5.2"),
        Arc::new(registry),
    );
    let db = Database::open_in_memory();
    let runner = JobRunner::new(db.clone())
        .with_environment(env.clone())
        .with_retry(retry);
    Harness {
        db,
        queue: InMemoryJobQueue::new(),
        recorder,
        runner,
        env,
        interleave,
    }
}

impl Harness {
    fn remote_customer(&self, id: i64, group: i64, changed: &str) {
        self.recorder.respond(
            "customers",
            "read",
            json!({ "id": id }),
            Recorded::Ok(json!({
                "id": id,
                "email": format!("c{id}@example.com"),
                "groupId": group,
                "changed": changed,
            })),
        );
    }

    fn remote_group(&self, id: i64) {
        self.recorder.respond(
            "groups",
            "read",
            json!({ "id": id }),
            Recorded::Ok(json!({ "id": id, "name": "Retail", "changed": "2024-01-01 00:00:00" })),
        );
    }

    fn import(&self, id: i64, force: bool) -> SyncResult<Option<String>> {
        self.runner.call(
            &self.queue,
            BackendId::new(1),
            "import_record",
            &json!({ "model": CUSTOMER, "external_id": id, "force": force }),
        )
    }

    fn later(&self) -> chrono::DateTime<Utc> {
        Utc::now() + Duration::minutes(1)
    }
}

#[test]
fn import_creates_then_skips_unchanged_record() {
    let h = harness(RetryConfig::no_retry());
    h.remote_group(5);
    h.remote_customer(1, 5, "2024-01-01 10:00:00");

    assert_eq!(h.import(1, false).unwrap(), None);

    let customers = h.db.bindings_of(BackendId::new(1), CUSTOMER);
    assert_eq!(customers.len(), 1);
    assert_eq!(customers[0].external_id, Some(ExternalId::Int(1)));
    let groups = h.db.bindings_of(BackendId::new(1), GROUP);
    assert_eq!(groups.len(), 1);

    let partner = h.db.browse("res.partner", customers[0].record_id().unwrap()).unwrap();
    assert_eq!(partner.get("email"), Some(&json!("c1@example.com")));
    assert_eq!(partner.get("customer"), Some(&json!(true)));
    assert_eq!(
        partner.get("group_id"),
        Some(&json!(groups[0].record_id().unwrap().as_u64()))
    );

    assert_eq!(h.import(1, false).unwrap().as_deref(), Some("Already up-to-date."));
    assert_eq!(h.import(1, true).unwrap(), None);

    assert_eq!(h.recorder.calls_to("customers", "read").len(), 3);
    assert_eq!(h.recorder.calls_to("groups", "read").len(), 1);
    assert_eq!(h.db.bindings_of(BackendId::new(1), CUSTOMER).len(), 1);
    // imported writes never come back as exports
    assert!(h.queue.jobs_for("export_record").is_empty());
}

#[test]
fn newer_remote_record_updates_without_create_rules() {
    let h = harness(RetryConfig::no_retry());
    h.remote_group(5);
    h.remote_customer(1, 5, "2024-01-01 10:00:00");
    h.import(1, false).unwrap();

    let binding = h.db.bindings_of(BackendId::new(1), CUSTOMER).remove(0);
    let record_id = binding.record_id().unwrap();
    h.db.transaction(|txn| {
        txn.write(
            "res.partner",
            record_id,
            values::object(json!({ "customer": false })),
            WriteContext::no_export(),
        )
    })
    .unwrap();

    let future = (Utc::now() + Duration::days(1)).format("%Y-%m-%d %H:%M:%S").to_string();
    h.recorder.respond(
        "customers",
        "read",
        json!({ "id": 1 }),
        Recorded::Ok(json!({ "id": 1, "email": "renamed@example.com", "groupId": 5, "changed": future })),
    );
    assert_eq!(h.import(1, false).unwrap(), None);

    let partner = h.db.browse("res.partner", record_id).unwrap();
    assert_eq!(partner.get("email"), Some(&json!("renamed@example.com")));
    assert_eq!(partner.get("customer"), Some(&json!(false)));
}

#[test]
fn vanished_record_is_skipped() {
    let h = harness(RetryConfig::no_retry());
    h.recorder
        .respond("customers", "read", json!({ "id": 2 }), Recorded::NotFound);

    assert_eq!(h.import(2, false).unwrap().as_deref(), Some("Record does no longer exist"));
    assert_eq!(h.db.binding_count(), 0);
}

#[test]
fn missing_dependency_rolls_back() {
    let h = harness(RetryConfig::no_retry());
    h.recorder
        .respond("groups", "read", json!({ "id": 6 }), Recorded::NotFound);
    h.remote_customer(3, 6, "2024-01-01 10:00:00");

    let err = h.import(3, false).unwrap_err();
    assert!(matches!(err, SyncError::Mapping(_)), "{err}");
    assert_eq!(h.db.binding_count(), 0);
    assert_eq!(h.db.record_count("res.partner"), 0);
}

#[test]
fn deferred_batch_schedules_one_job_per_record() {
    let h = harness(RetryConfig::no_retry());
    h.remote_group(5);
    h.remote_customer(1, 5, "2024-01-01 10:00:00");
    h.recorder
        .respond("customers", "read", json!({ "id": 2 }), Recorded::NotFound);
    h.recorder
        .respond("customers", "search", json!({}), Recorded::Ok(json!([1, 2])));

    h.queue
        .schedule(JobRequest::import_batch(BackendId::new(1), CUSTOMER, &SearchFilter::new()));
    let report = h.runner.run_pending(&h.queue, h.later());

    assert_eq!(report.done, 3);
    assert_eq!(report.failed, 0);
    let batch = h.queue.jobs_for("import_batch").remove(0);
    assert_eq!(
        batch.state,
        JobState::Done(Some("2 found, 0 imported, 0 skipped, 2 scheduled".into()))
    );
    let imports = h.queue.jobs_for("import_record");
    assert_eq!(imports.len(), 2);
    assert_eq!(imports[1].state, JobState::Done(Some("Record does no longer exist".into())));
    assert_eq!(h.db.bindings_of(BackendId::new(1), CUSTOMER).len(), 1);
}

#[test]
fn local_change_is_exported() {
    let h = harness(RetryConfig::no_retry());
    h.remote_group(5);
    h.remote_customer(1, 5, "2024-01-01 10:00:00");
    h.import(1, false).unwrap();
    let record_id = h.db.bindings_of(BackendId::new(1), CUSTOMER)[0].record_id().unwrap();

    h.db.transaction(|txn| {
        txn.write(
            "res.partner",
            record_id,
            values::object(json!({ "email": "new@example.com" })),
            WriteContext::default(),
        )?;
        let mut ctx = SyncContext::new(&h.env, txn, &h.queue);
        ctx.dispatch_write_events()?;
        Ok::<_, SyncError>(())
    })
    .unwrap();
    assert_eq!(h.queue.jobs_for("export_record").len(), 1);

    h.recorder.respond(
        "customers",
        "write",
        json!({ "id": 1, "data": { "email": "new@example.com" } }),
        Recorded::Ok(json!(true)),
    );
    let report = h.runner.run_pending(&h.queue, h.later());
    assert_eq!(report.done, 1);
    assert_eq!(h.recorder.calls_to("customers", "write").len(), 1);
}

#[test]
fn export_reconciles_existing_remote_record() {
    let h = harness(RetryConfig::no_retry());
    let binding_id = h
        .db
        .transaction(|txn| {
            h.env
                .binder(CUSTOMER)?
                .create_binding(txn, values::object(json!({ "email": "b@example.com" })))
        })
        .unwrap();

    h.recorder.respond(
        "customers",
        "create",
        json!({ "data": { "email": "b@example.com" } }),
        Recorded::AlreadyExists,
    );
    h.recorder.respond(
        "customers",
        "search_read",
        json!({ "conditions": { "email": "b@example.com" } }),
        Recorded::Ok(json!([{ "id": 77, "email": "b@example.com" }])),
    );

    let outcome = h
        .db
        .transaction(|txn| {
            let mut ctx = SyncContext::new(&h.env, txn, &h.queue);
            h.env.exporter(CUSTOMER)?.run(&mut ctx, binding_id, None)
        })
        .unwrap();

    assert_eq!(
        outcome,
        ExportOutcome::Exported {
            external_id: ExternalId::Int(77),
            created: true,
        }
    );
    assert_eq!(h.db.binding(binding_id).unwrap().external_id, Some(ExternalId::Int(77)));
}

#[test]
fn export_without_reconciliation_fails() {
    let h = harness(RetryConfig::no_retry());
    let binding_id = h
        .db
        .transaction(|txn| {
            h.env
                .binder(CUSTOMER)?
                .create_binding(txn, values::object(json!({ "email": "c@example.com" })))
        })
        .unwrap();
    h.recorder.respond(
        "customers",
        "create",
        json!({ "data": { "email": "c@example.com" } }),
        Recorded::AlreadyExists,
    );
    h.recorder.respond(
        "customers",
        "search_read",
        json!({ "conditions": { "email": "c@example.com" } }),
        Recorded::Ok(json!([])),
    );

    let err = h
        .runner
        .call(
            &h.queue,
            BackendId::new(1),
            "export_record",
            &json!({ "model": CUSTOMER, "binding_id": binding_id }),
        )
        .unwrap_err();
    assert!(matches!(err, SyncError::AlreadyExists(_)));
    assert_eq!(h.db.binding(binding_id).unwrap().external_id, None);
}

#[test]
fn concurrent_import_is_postponed_until_lock_is_free() {
    let h = harness(RetryConfig::immediate(3));
    h.remote_group(5);
    h.remote_customer(1, 5, "2024-01-01 10:00:00");

    let mut other = h.db.begin();
    other
        .acquire_or_retry("import(shopware, 1, test.customer, 1)")
        .unwrap();

    let job = h
        .queue
        .schedule(JobRequest::import_record(BackendId::new(1), CUSTOMER, &ExternalId::Int(1), false));
    let after_first = h.runner.run_next(&h.queue, h.later()).unwrap();
    assert_eq!(after_first.state, JobState::Pending);
    assert_eq!(after_first.attempts, 1);
    assert!(after_first.last_error.unwrap().contains("is held by another job"));

    other.abort();
    let report = h.runner.run_pending(&h.queue, h.later());
    assert_eq!(report.done, 1);
    assert_eq!(h.queue.get(job).unwrap().attempts, 2);
    assert_eq!(h.db.bindings_of(BackendId::new(1), CUSTOMER).len(), 1);
}

/// Arranges for another job to import `id` completely while the next
/// import of the harness sits between its first binding lookup and the lock.
fn import_concurrently_before_the_lock(h: &Harness, id: i64) {
    let competitor = JobRunner::new(h.db.clone()).with_environment(h.env.clone());
    *h.interleave.lock().unwrap() = Some(Box::new(move || {
        let message = competitor
            .call(
                &InMemoryJobQueue::new(),
                BackendId::new(1),
                "import_record",
                &json!({ "model": CUSTOMER, "external_id": id, "force": false }),
            )
            .unwrap();
        assert_eq!(message, None);
    }));
}

#[test]
fn import_bound_meanwhile_is_up_to_date() {
    let h = harness(RetryConfig::no_retry());
    h.remote_group(5);
    h.remote_customer(42, 5, "2024-01-01 10:00:00");
    import_concurrently_before_the_lock(&h, 42);

    assert_eq!(h.import(42, false).unwrap().as_deref(), Some("Already up-to-date."));
    assert!(h.interleave.lock().unwrap().is_none());
    assert_eq!(h.db.bindings_of(BackendId::new(1), CUSTOMER).len(), 1);
    assert_eq!(h.db.record_count("res.partner"), 1);
    assert_eq!(h.db.bindings_of(BackendId::new(1), GROUP).len(), 1);
}

#[test]
fn duplicate_binding_at_commit_is_retried() {
    let err = SyncError::Store(CoreError::DuplicateBinding {
        model: CUSTOMER.into(),
        backend_id: BackendId::new(1),
        detail: "external id 42".into(),
    });
    assert!(err.is_retryable());
    assert!(!err.requires_attention());
}

#[test]
fn record_without_modification_date_is_always_imported() {
    let h = harness(RetryConfig::no_retry());
    h.remote_group(5);
    h.recorder.respond(
        "customers",
        "read",
        json!({ "id": 42 }),
        Recorded::Ok(json!({ "id": 42, "email": "old@example.com", "groupId": 5, "changed": null })),
    );

    assert_eq!(h.import(42, false).unwrap(), None);
    let first = h.db.bindings_of(BackendId::new(1), CUSTOMER).remove(0);
    assert_eq!(first.external_id, Some(ExternalId::Int(42)));
    assert!(first.sync_date.is_some());

    // no date to compare with the sync date, so the record is never skipped
    assert_eq!(h.import(42, false).unwrap(), None);
    assert_eq!(h.db.bindings_of(BackendId::new(1), CUSTOMER).len(), 1);

    h.remote_customer(42, 5, "2024-01-01 10:00:00");
    assert_eq!(h.import(42, false).unwrap(), None);
    let customers = h.db.bindings_of(BackendId::new(1), CUSTOMER);
    assert_eq!(customers.len(), 1);
    assert_eq!(customers[0].id, first.id);
    assert_eq!(customers[0].record_id(), first.record_id());
    let partner = h.db.browse("res.partner", first.record_id().unwrap()).unwrap();
    assert_eq!(partner.get("email"), Some(&json!("c42@example.com")));
    assert_eq!(h.db.record_count("res.partner"), 1);
    assert_eq!(h.recorder.calls_to("customers", "read").len(), 3);
}

#[test]
fn retryable_failures_exhaust_the_budget() {
    let h = harness(RetryConfig::immediate(3));
    h.recorder
        .respond("customers", "read", json!({ "id": 9 }), Recorded::Unavailable);

    let job = h
        .queue
        .schedule(JobRequest::import_record(BackendId::new(1), CUSTOMER, &ExternalId::Int(9), false));
    let report = h.runner.run_pending(&h.queue, h.later());

    assert_eq!(report.postponed, 2);
    assert_eq!(report.failed, 1);
    let job = h.queue.get(job).unwrap();
    assert_eq!(job.attempts, 3);
    assert!(matches!(job.state, JobState::Failed(_)));
}

#[test]
fn permanent_failures_are_not_retried() {
    let h = harness(RetryConfig::immediate(3));
    h.recorder.respond(
        "customers",
        "read",
        json!({ "id": 10 }),
        Recorded::Fault("401 unauthorized".into()),
    );

    let job = h
        .queue
        .schedule(JobRequest::import_record(BackendId::new(1), CUSTOMER, &ExternalId::Int(10), false));
    let report = h.runner.run_pending(&h.queue, h.later());
    assert_eq!(report.failed, 1);
    assert_eq!(h.queue.get(job).unwrap().attempts, 1);
}
