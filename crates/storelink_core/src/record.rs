//! Records and write notifications.

use crate::types::{BindingId, RecordId};
use crate::values::Values;

/// A stored record: a model name, an id and its field values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Model the record belongs to (e.g. `res.partner`).
    pub model: String,
    /// Record id.
    pub id: RecordId,
    /// Current field values.
    pub values: Values,
}

impl Record {
    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.values.get(field)
    }
}

/// Flags carried by a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteContext {
    /// The write comes from the remote system; listeners must not push it
    /// back.
    pub no_export: bool,
}

impl WriteContext {
    /// Context for writes originating from an import.
    pub const fn no_export() -> Self {
        Self { no_export: true }
    }
}

/// What a write touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    /// A plain record.
    Record(RecordId),
    /// The binding-specific fields of a binding.
    Binding(BindingId),
}

/// Notification emitted for every create or write inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteEvent {
    /// Model written to. For bindings this is the binding model.
    pub model: String,
    /// Written record or binding.
    pub target: WriteTarget,
    /// Names of the fields present in the write.
    pub fields: Vec<String>,
    /// Whether this was a creation.
    pub created: bool,
    /// Flags of the write.
    pub context: WriteContext,
}

impl WriteEvent {
    /// Returns true if the write touched any of `fields`.
    pub fn touches(&self, fields: &[&str]) -> bool {
        self.fields.iter().any(|f| fields.contains(&f.as_str()))
    }
}
