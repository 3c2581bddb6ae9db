//! Imports from a Shopware backend, replayed from recorded responses.

mod common;

use common::{done_message, failure, shopware, with_shop, BACKEND};
use serde_json::{json, Value};
use storelink_core::{values, ExternalId, Record, RecordId, RecordStore, WriteContext};
use storelink_engine::checkpoint::CHECKPOINT_MODEL;
use storelink_engine::{Recorded, SearchFilter, SyncError};
use storelink_shopware::models::{
    local, ADDRESS, ARTICLE, PARTNER, PARTNER_CATEGORY, PRODUCT, PRODUCT_CATEGORY, SHOP,
};
use storelink_testkit::fixtures::{at, remote};
use storelink_testkit::TestBackend;

fn field<'a>(record: &'a Record, name: &str) -> &'a Value {
    record.get(name).unwrap_or(&Value::Null)
}

fn record(backend: &TestBackend, model: &str, id: RecordId) -> Record {
    backend.db.browse(model, id).unwrap()
}

#[test]
fn metadata_imports_shops_in_place() {
    let backend = shopware();
    backend.remote_search("shops", &SearchFilter::new(), &[1, 2]);
    backend.remote_record("shops", 1, json!({"id": 1, "name": "Main", "active": true, "position": 0}));
    backend.remote_record("shops", 2, json!({"id": 2, "name": null, "active": "0", "position": 1}));

    backend.call("synchronize_metadata", json!({})).unwrap();

    let shops = backend.db.bindings_of(BACKEND, SHOP);
    assert_eq!(shops.len(), 2);
    assert_eq!(shops[0].get("name"), Some(&json!("Main")));
    assert_eq!(shops[0].get("enabled"), Some(&json!(true)));
    assert_eq!(shops[0].get("create_invoice_on"), Some(&json!("paid")));
    assert_eq!(shops[1].get("name"), Some(&json!("Undefined")));
    assert_eq!(shops[1].get("enabled"), Some(&json!(false)));
    assert!(backend.queue.jobs().is_empty());
}

#[test]
fn customer_groups_are_matched_by_name() {
    let backend = shopware();
    let existing = backend
        .local(|ctx| {
            let group = values::object(json!({"name": "EK"}));
            Ok(ctx.session.create(local::PARTNER_CATEGORY, group, WriteContext::default())?)
        })
        .unwrap();
    backend.remote_record("customerGroups", 3, json!({"id": 3, "key": "EK"}));

    backend.import(PARTNER_CATEGORY, 3, false).unwrap();

    let groups = backend.db.bindings_of(BACKEND, PARTNER_CATEGORY);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].record_id(), Some(existing));
    assert_eq!(backend.db.record_count(local::PARTNER_CATEGORY), 1);
}

fn customer(backend: &TestBackend, addresses: &[(i64, Value)]) {
    backend.remote_record("customerGroups", 3, json!({"id": 3, "key": "EK"}));
    backend.remote_record(
        "customers",
        7,
        remote(
            7,
            "2024-01-02 10:00:00",
            json!({
                "email": "jane@example.com",
                "firstname": "Jane",
                "lastname": "Doe",
                "group_id": 3,
                "shop_id": 1,
            }),
        ),
    );
    let ids: Vec<i64> = addresses.iter().map(|(id, _)| *id).collect();
    backend.remote_search(
        "addresses",
        &SearchFilter::new().with_condition("customer_id", 7),
        &ids,
    );
    for (id, address) in addresses {
        backend.remote_record("addresses", *id, address.clone());
    }
}

#[test]
fn billing_address_of_an_individual_is_merged() {
    let backend = shopware();
    with_shop(&backend);
    customer(
        &backend,
        &[
            (
                70,
                json!({
                    "id": 70,
                    "firstname": "Jane",
                    "lastname": "Doe",
                    "street": "Main St 1\nFloor 2",
                    "postcode": "1000",
                    "city": "Town",
                    "is_default_billing": true,
                    "is_default_shipping": false,
                }),
            ),
            (
                71,
                json!({
                    "id": 71,
                    "firstname": "John",
                    "lastname": "Doe",
                    "street": "Side St 2",
                    "city": "Village",
                    "is_default_billing": false,
                    "is_default_shipping": true,
                }),
            ),
        ],
    );

    assert_eq!(backend.import(PARTNER, 7, false).unwrap(), None);

    let partners = backend.db.bindings_of(BACKEND, PARTNER);
    assert_eq!(partners.len(), 1);
    let partner_id = partners[0].record_id().unwrap();
    assert_eq!(partners[0].get("consider_as_company"), Some(&json!(false)));
    assert_eq!(partners[0].get("shop_id"), Some(&json!(backend.db.bindings_of(BACKEND, SHOP)[0].id.as_u64())));

    let partner = record(&backend, local::PARTNER, partner_id);
    assert_eq!(field(&partner, "name"), "Jane Doe");
    assert_eq!(field(&partner, "email"), "jane@example.com");
    assert_eq!(field(&partner, "street"), "Main St 1");
    assert_eq!(field(&partner, "street2"), "Floor 2");
    assert_eq!(field(&partner, "zip"), "1000");
    assert_eq!(field(&partner, "type"), "default");
    assert_eq!(field(&partner, "lang"), "en_US");
    let group = backend.db.bindings_of(BACKEND, PARTNER_CATEGORY)[0].record_id().unwrap();
    assert_eq!(field(&partner, "category_ids"), &json!([group.as_u64()]));

    let addresses = backend.db.bindings_of(BACKEND, ADDRESS);
    assert_eq!(addresses.len(), 2);
    assert_eq!(addresses[0].record_id(), Some(partner_id));
    let shipping = record(&backend, local::PARTNER, addresses[1].record_id().unwrap());
    assert_eq!(field(&shipping, "parent_id"), &json!(partner_id.as_u64()));
    assert_eq!(field(&shipping, "type"), "delivery");
    assert_eq!(field(&shipping, "name"), "John Doe");
    assert_eq!(field(&shipping, "lang"), "en_US");
    assert_eq!(addresses[1].get("shopware_partner_id"), Some(&json!(partners[0].id.as_u64())));
}

#[test]
fn billing_address_of_a_company_is_copied_onto_the_partner() {
    let backend = shopware();
    with_shop(&backend);
    customer(
        &backend,
        &[(
            80,
            json!({
                "id": 80,
                "firstname": "Jane",
                "lastname": "Doe",
                "company": "Acme Ltd",
                "street": "Industry Rd 9",
                "city": "Town",
                "is_default_billing": true,
                "is_default_shipping": true,
            }),
        )],
    );

    backend.import(PARTNER, 7, false).unwrap();

    let partners = backend.db.bindings_of(BACKEND, PARTNER);
    let partner_id = partners[0].record_id().unwrap();
    assert_eq!(partners[0].get("consider_as_company"), Some(&json!(true)));
    let partner = record(&backend, local::PARTNER, partner_id);
    assert_eq!(field(&partner, "name"), "Acme Ltd");
    assert_eq!(field(&partner, "street"), "Industry Rd 9");

    let addresses = backend.db.bindings_of(BACKEND, ADDRESS);
    assert_eq!(addresses.len(), 1);
    let contact = record(&backend, local::PARTNER, addresses[0].record_id().unwrap());
    assert_ne!(contact.id, partner_id);
    assert_eq!(field(&contact, "parent_id"), &json!(partner_id.as_u64()));
    assert_eq!(field(&contact, "type"), "invoice");
    assert_eq!(field(&contact, "name"), "Jane Doe");
}

#[test]
fn existing_customer_with_the_same_email_is_bound() {
    let backend = shopware();
    with_shop(&backend);
    let existing = backend
        .local(|ctx| {
            let partner = values::object(json!({"name": "Jane", "email": "jane@example.com", "customer": true}));
            Ok(ctx.session.create(local::PARTNER, partner, WriteContext::default())?)
        })
        .unwrap();
    customer(&backend, &[]);

    backend.import(PARTNER, 7, false).unwrap();

    let partners = backend.db.bindings_of(BACKEND, PARTNER);
    assert_eq!(partners[0].record_id(), Some(existing));
    assert_eq!(backend.db.record_count(local::PARTNER), 1);
}

#[test]
fn customer_of_a_vanished_group_is_not_imported() {
    let backend = shopware();
    backend.respond("customerGroups", "read", json!({"id": 9}), Recorded::NotFound);
    backend.remote_record(
        "customers",
        7,
        remote(7, "2024-01-02 10:00:00", json!({"email": "jane@example.com", "group_id": 9})),
    );

    let err = backend.import(PARTNER, 7, false).unwrap_err();
    match err {
        SyncError::Mapping(message) => {
            assert_eq!(message, "The partner category with shopware id 9 does not exist")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(backend.db.bindings_of(BACKEND, PARTNER).is_empty());
}

#[test]
fn unchanged_customer_is_skipped() {
    let backend = shopware();
    with_shop(&backend);
    customer(&backend, &[]);
    backend.import(PARTNER, 7, false).unwrap();

    let message = backend.import(PARTNER, 7, false).unwrap();
    assert_eq!(message.as_deref(), Some("Already up-to-date."));
}

fn category_tree(backend: &TestBackend) {
    backend.respond(
        "categories",
        "tree",
        json!({}),
        Recorded::Ok(json!([
            {"id": 1, "children": [
                {"id": 2, "children": [{"id": 3, "children": []}]}
            ]}
        ])),
    );
    backend.remote_record("categories", 1, json!({"id": 1, "level": 0, "parent_id": null, "name": "Root"}));
    backend.remote_record(
        "categories",
        2,
        remote(2, "2024-01-01 00:00:00", json!({"level": 1, "parent_id": 1, "name": "Shoes"})),
    );
    backend.remote_record(
        "categories",
        3,
        remote(3, "2024-01-01 00:00:00", json!({"level": 2, "parent_id": 2, "name": "Boots"})),
    );
}

#[test]
fn category_tree_is_imported_parents_first() {
    let backend = shopware();
    category_tree(&backend);

    backend.import_batch(PRODUCT_CATEGORY, &SearchFilter::new()).unwrap();
    let priorities: Vec<u32> = backend
        .jobs_for_model("import_record", PRODUCT_CATEGORY)
        .iter()
        .map(|job| job.priority)
        .collect();
    assert_eq!(priorities, vec![10, 11, 12]);

    let report = backend.run_jobs();
    assert_eq!(report.done, 3);

    let categories = backend.db.bindings_of(BACKEND, PRODUCT_CATEGORY);
    assert_eq!(categories.len(), 3);
    let root = record(&backend, local::PRODUCT_CATEGORY, categories[0].record_id().unwrap());
    assert_eq!(field(&root, "name"), "Demo Store");
    let shoes = record(&backend, local::PRODUCT_CATEGORY, categories[1].record_id().unwrap());
    assert_eq!(field(&shoes, "parent_id"), &json!(root.id.as_u64()));
    assert_eq!(categories[2].get("shopware_parent_id"), Some(&json!(categories[1].id.as_u64())));
    assert_eq!(backend.db.record_count(CHECKPOINT_MODEL), 3);
}

#[test]
fn category_window_selects_updated_categories() {
    let backend = shopware();
    category_tree(&backend);
    let filter = SearchFilter::between(Some(at("2024-01-01 00:00:00")), Some(at("2024-02-01 00:00:00")));
    backend.remote_search("categories", &filter, &[3]);

    let message = backend.import_batch(PRODUCT_CATEGORY, &filter).unwrap();

    assert_eq!(message.as_deref(), Some("1 found, 0 imported, 0 skipped, 1 scheduled"));
    let jobs = backend.jobs_for_model("import_record", PRODUCT_CATEGORY);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].priority, 12);
    assert_eq!(jobs[0].args["external_id"], json!(3));
}

#[test]
fn child_category_pulls_its_parents() {
    let backend = shopware();
    category_tree(&backend);

    backend.import(PRODUCT_CATEGORY, 3, false).unwrap();

    assert_eq!(backend.db.bindings_of(BACKEND, PRODUCT_CATEGORY).len(), 3);
}

fn article(backend: &TestBackend) {
    backend.remote_record(
        "articles",
        20,
        remote(
            20,
            "2024-01-05 00:00:00",
            json!({
                "name": "Shirt",
                "description": "Short",
                "descriptionLong": "Long",
                "active": true,
                "categories": [],
                "mainDetail": {"id": 200},
                "details": [{"id": 200}, {"id": 201}],
            }),
        ),
    );
    backend.remote_record(
        "variants",
        200,
        json!({
            "id": 200,
            "articleId": 20,
            "number": "SH-1",
            "ean": "4006381333931",
            "weight": "0.5",
            "prices": [{"from": 1, "price": 19.9, "customerGroup": {"key": "EK"}}],
        }),
    );
    backend.remote_record(
        "variants",
        201,
        json!({"id": 201, "articleId": 20, "number": "SH-2", "prices": []}),
    );
}

#[test]
fn article_import_schedules_its_variants() {
    let backend = shopware();
    article(&backend);

    backend.import(ARTICLE, 20, false).unwrap();
    let variants: Vec<Value> = backend
        .jobs_for_model("import_record", PRODUCT)
        .iter()
        .map(|job| job.args["external_id"].clone())
        .collect();
    assert_eq!(variants, vec![json!(200), json!(201)]);

    let report = backend.run_jobs();
    assert_eq!((report.done, report.failed), (1, 1));

    let failed = backend
        .jobs_for_model("import_record", PRODUCT)
        .into_iter()
        .find(|job| job.args["external_id"] == json!(201))
        .unwrap();
    assert!(failure(&failed).contains("Could not store the price for the article detail with shopware id 201"));

    let products = backend.db.bindings_of(BACKEND, PRODUCT);
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].external_id, Some(ExternalId::Int(200)));
    assert_eq!(products[0].get("manage_stock"), Some(&json!("use_default")));
    let article = &backend.db.bindings_of(BACKEND, ARTICLE)[0];
    assert_eq!(products[0].get("shopware_article_id"), Some(&json!(article.id.as_u64())));

    let product = record(&backend, local::PRODUCT, products[0].record_id().unwrap());
    assert_eq!(field(&product, "default_code"), "SH-1");
    assert_eq!(field(&product, "name"), "Shirt");
    assert_eq!(field(&product, "description"), "Long");
    assert_eq!(field(&product, "list_price"), &json!(19.9));
    assert_eq!(field(&product, "weight"), &json!(0.5));
    assert_eq!(backend.db.record_count(CHECKPOINT_MODEL), 1);
}

#[test]
fn variant_is_imported_again_every_time() {
    let backend = shopware();
    article(&backend);
    backend.import(PRODUCT, 200, false).unwrap();

    let message = backend.import(PRODUCT, 200, false).unwrap();

    assert_eq!(message, None);
    assert_eq!(backend.db.bindings_of(BACKEND, PRODUCT).len(), 1);
}

#[test]
fn article_in_unknown_category_is_not_imported() {
    let backend = shopware();
    backend.respond("categories", "read", json!({"id": 44}), Recorded::NotFound);
    backend.remote_record(
        "articles",
        21,
        remote(21, "2024-01-05 00:00:00", json!({"name": "Hat", "categories": [{"id": 44}]})),
    );

    let err = backend.import(ARTICLE, 21, false).unwrap_err();

    assert!(matches!(err, SyncError::Mapping(ref m) if m == "The product category with shopware id 44 is not imported."));
}

#[test]
fn partners_are_scheduled_per_shop_from_the_watermark() {
    let backend = shopware();
    with_shop(&backend);

    let message = backend
        .call("import_partners", json!({"now": "2024-03-01 12:00:00"}))
        .unwrap();
    assert_eq!(message.as_deref(), Some("1 shop(s) scheduled"));
    backend
        .call("import_partners", json!({"now": "2024-03-02 12:00:00"}))
        .unwrap();

    let jobs = backend.jobs_for_model("import_batch", PARTNER);
    assert_eq!(jobs.len(), 2);
    let first: SearchFilter = serde_json::from_value(jobs[0].args["filter"].clone()).unwrap();
    assert_eq!(first.from_date, None);
    assert_eq!(first.conditions.get("shop_id"), Some(&json!(1)));
    let second: SearchFilter = serde_json::from_value(jobs[1].args["filter"].clone()).unwrap();
    assert_eq!(second.from_date, Some(at("2024-03-01 11:59:30")));
    assert_eq!(second.to_date, Some(at("2024-03-02 12:00:00")));
    assert_eq!(second.conditions, first.conditions);
}

#[test]
fn customer_groups_need_the_shops_first() {
    let backend = shopware();
    backend.remote_search("shops", &SearchFilter::new(), &[1]);
    backend.remote_record("shops", 1, json!({"id": 1, "name": "Main"}));

    backend.call("import_customer_groups", json!({})).unwrap();

    assert_eq!(backend.db.bindings_of(BACKEND, SHOP).len(), 1);
    assert_eq!(backend.jobs_for_model("import_batch", PARTNER_CATEGORY).len(), 1);

    backend.remote_search("customerGroups", &SearchFilter::new(), &[3]);
    backend.remote_record("customerGroups", 3, json!({"id": 3, "key": "EK"}));
    let report = backend.run_jobs();
    assert_eq!(report.done, 2);
    let batch = &backend.jobs_for_model("import_batch", PARTNER_CATEGORY)[0];
    assert_eq!(done_message(batch), Some("1 found, 0 imported, 0 skipped, 1 scheduled"));
}
