//! Property tests for mappers and the staleness rule.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use storelink_core::{timestamp, values, BackendId, Binding, BindingId, Database, ExternalId, Values};
use storelink_engine::mapper::convert;
use storelink_engine::{
    is_up_to_date, BackendConfig, ConnectorRegistry, Environment, ImportMapper, MapContext,
    MapOptions,
};

fn mapper() -> ImportMapper {
    ImportMapper::new("shopware.res.partner")
        .direct("email", "email")
        .direct_with("active", "active", convert::boolean)
        .rule("name", |_, record| {
            let parts: Vec<&str> = ["firstname", "lastname"]
                .iter()
                .filter_map(|key| values::get_str(record, key))
                .filter(|part| !part.is_empty())
                .collect();
            Ok(values::object(json!({ "name": parts.join(" ") })))
        })
        .rule_on_create("customer", |_, _| Ok(values::object(json!({ "customer": true }))))
        .rule_on_create("lang", |ctx, _| {
            Ok(values::object(json!({ "lang": ctx.backend().default_lang })))
        })
}

fn env() -> Environment {
    Environment::new(
        BackendConfig::new(BackendId::new(1), "shopware", "5.2").with_default_lang("de_DE"),
        Arc::new(ConnectorRegistry::new()),
    )
}

fn remote_record() -> impl Strategy<Value = Values> {
    (
        proptest::option::of("[a-z]{1,8}@[a-z]{1,8}\\.com"),
        proptest::option::of(any::<bool>()),
        "[A-Za-z]{0,10}",
        "[A-Za-z]{0,10}",
    )
        .prop_map(|(email, active, first, last)| {
            let mut record = values::object(json!({ "firstname": first, "lastname": last }));
            if let Some(email) = email {
                record.insert("email".into(), json!(email));
            }
            if let Some(active) = active {
                record.insert("active".into(), json!(if active { "1" } else { "0" }));
            }
            record
        })
}

proptest! {
    #[test]
    fn mapping_is_deterministic(record in remote_record(), for_create in any::<bool>()) {
        let env = env();
        let db = Database::open_in_memory();
        let txn = db.begin();
        let ctx = MapContext::new(&env, &txn, MapOptions::new());
        let mapper = mapper();

        let first = mapper.map_record(&record).values(&ctx, for_create).unwrap();
        let second = mapper.map_record(&record).values(&ctx, for_create).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn update_values_are_create_values_minus_create_rules(record in remote_record()) {
        let env = env();
        let db = Database::open_in_memory();
        let txn = db.begin();
        let ctx = MapContext::new(&env, &txn, MapOptions::new());
        let mapper = mapper();

        let mut created = mapper.map_record(&record).values(&ctx, true).unwrap();
        let updated = mapper.map_record(&record).values(&ctx, false).unwrap();

        prop_assert!(!updated.contains_key("customer"));
        prop_assert!(!updated.contains_key("lang"));
        prop_assert_eq!(created.remove("customer"), Some(json!(true)));
        prop_assert_eq!(created.remove("lang"), Some(json!("de_DE")));
        prop_assert_eq!(created, updated);
    }

    #[test]
    fn direct_copies_follow_source_presence(record in remote_record()) {
        let env = env();
        let db = Database::open_in_memory();
        let txn = db.begin();
        let ctx = MapContext::new(&env, &txn, MapOptions::new());

        let mapped = mapper().map_record(&record).values(&ctx, false).unwrap();
        prop_assert_eq!(mapped.contains_key("email"), record.contains_key("email"));
        prop_assert_eq!(mapped.contains_key("active"), record.contains_key("active"));
    }

    #[test]
    fn staleness_compares_sync_date_and_change_date(
        changed_offset in -100_000i64..100_000,
        synced in any::<bool>(),
    ) {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let changed = base + Duration::seconds(changed_offset);
        let record = values::object(json!({ "changed": timestamp::format(&changed) }));
        let binding = Binding {
            id: BindingId::new(1),
            backend_id: BackendId::new(1),
            model: "shopware.res.partner".into(),
            external_id: Some(ExternalId::Int(1)),
            record: None,
            sync_date: synced.then_some(base),
            data: Values::new(),
        };

        let expected = synced && base >= changed;
        prop_assert_eq!(is_up_to_date(Some("changed"), &record, Some(&binding)), expected);
        prop_assert!(!is_up_to_date(Some("changed"), &record, None));
    }
}
