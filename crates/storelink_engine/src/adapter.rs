//! Remote API abstraction.
//!
//! An [`Adapter`] talks to one resource of the remote system. Failures are
//! classified through [`SyncError`]: `NotFoundRemotely` for missing
//! records, retryable or fatal `Transport` errors, `AlreadyExists` for
//! rejected creations.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use storelink_core::{ExternalId, Values};

/// Criteria for searching remote records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilter {
    /// Only records modified at or after this date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_date: Option<DateTime<Utc>>,
    /// Only records modified at or before this date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_date: Option<DateTime<Utc>>,
    /// Exact-match conditions on remote fields.
    #[serde(skip_serializing_if = "Values::is_empty")]
    pub conditions: Values,
}

impl SearchFilter {
    /// An empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to a modification window.
    pub fn between(from_date: Option<DateTime<Utc>>, to_date: Option<DateTime<Utc>>) -> Self {
        Self {
            from_date,
            to_date,
            conditions: Values::new(),
        }
    }

    /// Adds an exact-match condition.
    pub fn with_condition(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    /// Returns true when no date window is set.
    pub fn is_unbounded(&self) -> bool {
        self.from_date.is_none() && self.to_date.is_none()
    }
}

/// CRUD access to one remote resource.
pub trait Adapter: Send + Sync {
    /// Searches records and returns their ids.
    fn search(&self, filter: &SearchFilter) -> SyncResult<Vec<ExternalId>>;

    /// Reads one record. Missing records yield `NotFoundRemotely`.
    fn read(&self, id: &ExternalId) -> SyncResult<Values>;

    /// Searches records and returns their data.
    fn search_read(&self, filter: &SearchFilter) -> SyncResult<Vec<Values>>;

    /// Creates a record and returns its id.
    fn create(&self, data: &Values) -> SyncResult<ExternalId>;

    /// Updates a record.
    fn write(&self, id: &ExternalId, data: &Values) -> SyncResult<()>;

    /// Deletes a record.
    fn delete(&self, id: &ExternalId) -> SyncResult<()>;

    /// Calls a resource-specific method that has no CRUD counterpart (a
    /// category tree, the carriers accepted by an order).
    fn call(&self, method: &str, args: &Value) -> SyncResult<Value>;
}

/// A canned answer served by the [`Recorder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Recorded {
    /// Successful response.
    Ok(Value),
    /// The record does not exist.
    NotFound,
    /// A creation was refused because the record exists.
    AlreadyExists,
    /// Temporary unavailability.
    Unavailable,
    /// Permanent fault.
    Fault(String),
}

/// One call received by a recording adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Remote resource.
    pub resource: String,
    /// Adapter method.
    pub method: String,
    /// Call arguments.
    pub args: Value,
}

/// A stored response keyed by resource, method and arguments, as kept in a
/// fixture file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedResponse {
    /// Remote resource.
    pub resource: String,
    /// Adapter method.
    pub method: String,
    /// Call arguments.
    #[serde(default)]
    pub args: Value,
    /// Answer.
    pub response: Recorded,
}

/// Canned remote responses shared by recording adapters.
///
/// Calls are matched on `(resource, method, arguments)`. JSON objects are
/// key-ordered, so argument maps match regardless of insertion order.
#[derive(Debug, Default)]
pub struct Recorder {
    responses: Mutex<HashMap<(String, String, String), Recorded>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Builds a recorder from stored responses.
    pub fn from_responses(responses: impl IntoIterator<Item = RecordedResponse>) -> Arc<Self> {
        let recorder = Self::default();
        for r in responses {
            recorder.respond(&r.resource, &r.method, r.args, r.response);
        }
        Arc::new(recorder)
    }

    /// Registers the answer for a call.
    pub fn respond(&self, resource: &str, method: &str, args: Value, response: Recorded) {
        self.responses
            .lock()
            .insert(call_key(resource, method, &args), response);
    }

    /// Returns every call received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the calls of one method on one resource.
    pub fn calls_to(&self, resource: &str, method: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.resource == resource && c.method == method)
            .cloned()
            .collect()
    }

    /// Returns the number of create, write and delete calls.
    pub fn mutation_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c.method.as_str(), "create" | "write" | "delete"))
            .count()
    }

    /// Forgets the calls received so far.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn answer(&self, resource: &str, method: &str, args: Value) -> SyncResult<Value> {
        let key = call_key(resource, method, &args);
        let id = args
            .get("id")
            .map_or_else(|| key.2.clone(), |id| id.to_string().trim_matches('"').to_string());
        self.calls.lock().push(RecordedCall {
            resource: resource.to_string(),
            method: method.to_string(),
            args,
        });
        let response = self.responses.lock().get(&key).cloned();
        match response {
            Some(Recorded::Ok(value)) => Ok(value),
            Some(Recorded::NotFound) => Err(SyncError::NotFoundRemotely { id }),
            Some(Recorded::AlreadyExists) => Err(SyncError::AlreadyExists(format!(
                "{resource}.{method}"
            ))),
            Some(Recorded::Unavailable) => Err(SyncError::transport_retryable(format!(
                "{resource}.{method} unavailable"
            ))),
            Some(Recorded::Fault(message)) => Err(SyncError::transport_fatal(message)),
            None => Err(SyncError::transport_fatal(format!(
                "no recorded response for {resource}.{method}({})",
                key.2
            ))),
        }
    }
}

fn call_key(resource: &str, method: &str, args: &Value) -> (String, String, String) {
    (resource.to_string(), method.to_string(), args.to_string())
}

/// Adapter serving responses from a [`Recorder`].
///
/// Arguments are encoded as:
/// - `search` / `search_read`: the serialized [`SearchFilter`]
/// - `read` / `delete`: `{"id": id}`
/// - `create`: `{"data": data}`
/// - `write`: `{"id": id, "data": data}`
/// - `call`: the raw arguments, under the given method name
#[derive(Debug, Clone)]
pub struct RecordingAdapter {
    resource: String,
    recorder: Arc<Recorder>,
}

impl RecordingAdapter {
    /// Creates an adapter for `resource`.
    pub fn new(resource: impl Into<String>, recorder: Arc<Recorder>) -> Self {
        Self {
            resource: resource.into(),
            recorder,
        }
    }

    /// Returns the resource name.
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Adapter for RecordingAdapter {
    fn search(&self, filter: &SearchFilter) -> SyncResult<Vec<ExternalId>> {
        let value = self
            .recorder
            .answer(&self.resource, "search", serde_json::to_value(filter)?)?;
        Ok(serde_json::from_value(value)?)
    }

    fn read(&self, id: &ExternalId) -> SyncResult<Values> {
        let value = self
            .recorder
            .answer(&self.resource, "read", json!({ "id": id }))?;
        into_values(value)
    }

    fn search_read(&self, filter: &SearchFilter) -> SyncResult<Vec<Values>> {
        let value = self
            .recorder
            .answer(&self.resource, "search_read", serde_json::to_value(filter)?)?;
        Ok(serde_json::from_value(value)?)
    }

    fn create(&self, data: &Values) -> SyncResult<ExternalId> {
        let value = self
            .recorder
            .answer(&self.resource, "create", json!({ "data": data }))?;
        ExternalId::from_value(&value)
            .ok_or_else(|| SyncError::Protocol(format!("create returned no id: {value}")))
    }

    fn write(&self, id: &ExternalId, data: &Values) -> SyncResult<()> {
        self.recorder
            .answer(&self.resource, "write", json!({ "id": id, "data": data }))?;
        Ok(())
    }

    fn delete(&self, id: &ExternalId) -> SyncResult<()> {
        self.recorder
            .answer(&self.resource, "delete", json!({ "id": id }))?;
        Ok(())
    }

    fn call(&self, method: &str, args: &Value) -> SyncResult<Value> {
        self.recorder.answer(&self.resource, method, args.clone())
    }
}

/// Converts a JSON object into field values.
pub fn into_values(value: Value) -> SyncResult<Values> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(SyncError::Protocol(format!(
            "expected an object, got {other}"
        ))),
    }
}
