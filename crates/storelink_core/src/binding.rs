//! Bindings between local records and remote records.

use crate::types::{BackendId, BindingId, ExternalId, RecordId};
use crate::values::Values;
use chrono::{DateTime, Utc};

/// Reference to a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordRef {
    /// Model of the record.
    pub model: String,
    /// Record id.
    pub id: RecordId,
}

impl RecordRef {
    /// Creates a record reference.
    pub fn new(model: impl Into<String>, id: RecordId) -> Self {
        Self {
            model: model.into(),
            id,
        }
    }
}

/// Association between one local record and one remote record, scoped to a
/// backend.
///
/// A binding either wraps a generic record (`record` is set, the binding
/// only carries the sync metadata and its own fields) or is standalone and
/// keeps all of its data in `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// Binding id.
    pub id: BindingId,
    /// Backend the binding belongs to.
    pub backend_id: BackendId,
    /// Binding model (e.g. `shopware.res.partner`).
    pub model: String,
    /// Remote id. `None` until the record has been exported.
    pub external_id: Option<ExternalId>,
    /// Wrapped generic record, if any.
    pub record: Option<RecordRef>,
    /// Last successful synchronization.
    pub sync_date: Option<DateTime<Utc>>,
    /// Fields owned by the binding itself.
    pub data: Values,
}

impl Binding {
    /// Returns the wrapped record id, or `None` for standalone bindings.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record.as_ref().map(|r| r.id)
    }

    /// Returns a binding-specific field.
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.data.get(field)
    }
}

/// Values for a binding about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBinding {
    /// Backend the binding belongs to.
    pub backend_id: BackendId,
    /// Binding model.
    pub model: String,
    /// Remote id, if already known.
    pub external_id: Option<ExternalId>,
    /// Wrapped generic record.
    pub record: Option<RecordRef>,
    /// Fields owned by the binding.
    pub data: Values,
}

/// Description of a binding model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingModel {
    /// Binding model name.
    pub name: String,
    /// Model of the wrapped records. `None` for standalone bindings.
    pub target: Option<String>,
    /// Fields stored on the binding rather than the wrapped record.
    pub binding_fields: Vec<String>,
    /// Whether a record may be bound at most once per backend.
    pub one_per_record: bool,
}

impl BindingModel {
    /// Field that links a new binding to an existing record instead of
    /// creating one.
    pub const RECORD_FIELD: &'static str = "record_id";

    /// A binding model wrapping records of `target`.
    pub fn wrapping(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: Some(target.into()),
            binding_fields: Vec::new(),
            one_per_record: false,
        }
    }

    /// A standalone binding model.
    pub fn standalone(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            binding_fields: Vec::new(),
            one_per_record: false,
        }
    }

    /// Declares fields stored on the binding.
    pub fn with_binding_fields(mut self, fields: &[&str]) -> Self {
        self.binding_fields
            .extend(fields.iter().map(|f| (*f).to_string()));
        self
    }

    /// Restricts each record to one binding per backend.
    pub fn one_per_record(mut self) -> Self {
        self.one_per_record = true;
        self
    }

    /// Returns true when `field` is stored on the binding.
    pub fn is_binding_field(&self, field: &str) -> bool {
        self.target.is_none() || self.binding_fields.iter().any(|f| f == field)
    }

    /// Splits mapped values into `(record values, binding values, linked
    /// record)`.
    ///
    /// The record link field is removed from both halves.
    pub fn split(&self, values: Values) -> (Values, Values, Option<RecordId>) {
        let mut record = Values::new();
        let mut binding = Values::new();
        let mut link = None;
        for (key, value) in values {
            if key == Self::RECORD_FIELD {
                link = value.as_u64().filter(|id| *id != 0).map(RecordId::new);
            } else if self.is_binding_field(&key) {
                binding.insert(key, value);
            } else {
                record.insert(key, value);
            }
        }
        (record, binding, link)
    }
}
