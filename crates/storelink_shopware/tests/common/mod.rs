//! Shared setup of the Shopware integration tests.

#![allow(dead_code)]

use serde_json::json;
use storelink_core::{values, BackendId, BindingId, ExternalId, RecordId, RecordStore, WriteContext};
use storelink_engine::jobs::{Job, JobState};
use storelink_engine::{BackendConfig, SearchFilter, SyncResult};
use storelink_shopware::models::{local, SALE_ORDER};
use storelink_shopware::{backend, registry, BACKEND_TYPE};
use storelink_testkit::TestBackend;

pub const BACKEND: BackendId = BackendId(1);

/// A Shopware backend answering from recorded responses.
pub fn shopware() -> TestBackend {
    storelink_testkit::init_tracing();
    let config = BackendConfig::new(BACKEND, BACKEND_TYPE, "5.2")
        .with_name("Demo Store")
        .with_default_lang("en_US");
    TestBackend::new(config, |recorder| registry(recorder)).with_functions(backend::functions())
}

/// Records one shop and imports it.
pub fn with_shop(backend: &TestBackend) {
    backend.remote_search("shops", &SearchFilter::new(), &[1]);
    backend.remote_record(
        "shops",
        1,
        json!({"id": 1, "name": "Main", "active": true, "position": 0}),
    );
    backend.call("synchronize_metadata", json!({})).unwrap();
}

/// A sale order bound to remote order `100001` (entity 900), with one line
/// of product 10.
pub fn sale_order(backend: &TestBackend) -> (RecordId, BindingId) {
    let shop = backend.db.bindings_of(BACKEND, storelink_shopware::models::SHOP)[0].id;
    backend
        .local(|ctx| {
            let order = ctx.session.create(
                local::SALE_ORDER,
                values::object(json!({"name": "SO001"})),
                WriteContext::default(),
            )?;
            let binder = ctx.binder(SALE_ORDER)?;
            let binding = binder.create_binding(
                ctx.session,
                values::object(json!({
                    "record_id": order.as_u64(),
                    "shop_id": shop.as_u64(),
                    "shopware_order_id": 900,
                    "order_lines": [{"product_id": 10, "shopware_id": 501}],
                })),
            )?;
            binder.bind(ctx.session, &ExternalId::from("100001"), binding)?;
            SyncResult::Ok((order, binding))
        })
        .unwrap()
}

/// Returns the error of a failed job.
pub fn failure(job: &Job) -> &str {
    match &job.state {
        JobState::Failed(error) => error,
        other => panic!("job {} did not fail: {other:?}", job.function),
    }
}

/// Returns the message of a finished job.
pub fn done_message(job: &Job) -> Option<&str> {
    match &job.state {
        JobState::Done(message) => message.as_deref(),
        other => panic!("job {} is not done: {other:?}", job.function),
    }
}
