//! Remote payload fixtures.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use storelink_core::{timestamp, values};
use storelink_engine::{Recorded, RecordedResponse};

/// A remote record with an id, a modification date and extra fields.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use storelink_testkit::fixtures::remote;
///
/// let customer = remote(7, "2024-01-01 10:00:00", json!({"email": "a@example.com"}));
/// assert_eq!(customer["id"], 7);
/// assert_eq!(customer["changed"], "2024-01-01 10:00:00");
/// ```
pub fn remote(id: i64, changed: &str, fields: Value) -> Value {
    let mut record = values::object(json!({ "id": id, "changed": changed }));
    values::merge(&mut record, values::object(fields));
    Value::Object(record)
}

/// Parses a timestamp written the way remote systems write them.
///
/// # Panics
///
/// Panics on input no remote format matches.
pub fn at(input: &str) -> DateTime<Utc> {
    match timestamp::parse(input) {
        Some(at) => at,
        None => panic!("not a timestamp: {input}"),
    }
}

/// A stored response answering a `read`.
pub fn read_response(resource: &str, id: i64, record: Value) -> RecordedResponse {
    RecordedResponse {
        resource: resource.to_string(),
        method: "read".to_string(),
        args: json!({ "id": id }),
        response: Recorded::Ok(record),
    }
}

/// A stored response answering a search without window or conditions.
pub fn search_response(resource: &str, ids: &[i64]) -> RecordedResponse {
    RecordedResponse {
        resource: resource.to_string(),
        method: "search".to_string(),
        args: json!({}),
        response: Recorded::Ok(json!(ids)),
    }
}
