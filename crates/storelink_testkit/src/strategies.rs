//! Proptest generators for remote data.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};
use storelink_core::{ExternalId, Values};

/// Remote ids, numeric or textual, never the empty id.
pub fn external_id() -> impl Strategy<Value = ExternalId> {
    prop_oneof![
        (1i64..1_000_000).prop_map(ExternalId::Int),
        "[a-z0-9]{1,12}".prop_map(ExternalId::Text),
    ]
}

/// Timestamps between 2000 and 2040, formatted `%Y-%m-%d %H:%M:%S`.
pub fn remote_timestamp() -> impl Strategy<Value = String> {
    (946_684_800i64..2_208_988_800).prop_map(|secs| {
        Utc.timestamp_opt(secs, 0)
            .single()
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default()
    })
}

/// Scalar field values.
pub fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::from),
    ]
}

/// Flat records with up to `max_fields` scalar fields.
pub fn flat_record(max_fields: usize) -> impl Strategy<Value = Values> {
    proptest::collection::btree_map("[a-z_]{1,10}", scalar(), 0..=max_fields)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Multi-line street fields with blank and padded lines.
pub fn street() -> impl Strategy<Value = String> {
    proptest::collection::vec(prop_oneof!["[A-Za-z0-9 ]{0,12}", Just("  ".to_string())], 0..5)
        .prop_map(|lines| lines.join("\n"))
}

/// Category trees as returned by shop APIs: nested `{"id", "children"}`
/// nodes with unique ids.
pub fn category_tree() -> impl Strategy<Value = Value> {
    let leaf = Just(json!([]));
    leaf.prop_recursive(3, 24, 4, |inner| proptest::collection::vec(inner, 0..4).prop_map(Value::Array))
        .prop_map(|shape| {
            let mut next = 0;
            number(&shape, &mut next)
        })
}

fn number(shape: &Value, next: &mut i64) -> Value {
    let children = shape.as_array().map(Vec::as_slice).unwrap_or_default();
    Value::Array(
        children
            .iter()
            .map(|child| {
                *next += 1;
                let id = *next;
                json!({ "id": id, "children": number(child, next) })
            })
            .collect(),
    )
}
