//! Persistence contracts consumed by the sync engine.

use crate::binding::{Binding, BindingModel, NewBinding};
use crate::error::CoreResult;
use crate::record::{Record, WriteContext, WriteEvent};
use crate::types::{BackendId, BindingId, ExternalId, RecordId};
use crate::values::Values;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Generic record persistence.
pub trait RecordStore {
    /// Creates a record and returns its id.
    fn create(&mut self, model: &str, values: Values, ctx: WriteContext) -> CoreResult<RecordId>;

    /// Reads a record. Missing records yield `None`.
    fn browse(&self, model: &str, id: RecordId) -> CoreResult<Option<Record>>;

    /// Merges `values` into an existing record.
    fn write(
        &mut self,
        model: &str,
        id: RecordId,
        values: Values,
        ctx: WriteContext,
    ) -> CoreResult<()>;

    /// Returns the ids of the records whose `field` equals `value`, in
    /// ascending order.
    fn search(&self, model: &str, field: &str, value: &Value) -> CoreResult<Vec<RecordId>>;
}

/// Binding persistence.
///
/// Implementations enforce the uniqueness rules of bindings and report
/// violations as [`CoreError::DuplicateBinding`](crate::CoreError).
pub trait BindingStore {
    /// Reads a binding by id.
    fn binding(&self, id: BindingId) -> CoreResult<Option<Binding>>;

    /// Finds the binding of a remote record.
    fn find_binding_by_external(
        &self,
        backend_id: BackendId,
        model: &str,
        external_id: &ExternalId,
    ) -> CoreResult<Option<Binding>>;

    /// Finds the binding wrapping a local record.
    fn find_binding_by_record(
        &self,
        backend_id: BackendId,
        model: &str,
        record_id: RecordId,
    ) -> CoreResult<Option<Binding>>;

    /// Lists every binding of a model for a backend, ordered by id.
    fn bindings_of(&self, backend_id: BackendId, model: &str) -> CoreResult<Vec<Binding>>;

    /// Inserts a binding.
    fn insert_binding(
        &mut self,
        binding: NewBinding,
        model: &BindingModel,
        ctx: WriteContext,
    ) -> CoreResult<BindingId>;

    /// Merges binding-specific fields.
    fn write_binding(&mut self, id: BindingId, data: Values, ctx: WriteContext) -> CoreResult<()>;

    /// Sets the remote id and the last synchronization date.
    fn mark_synced(
        &mut self,
        id: BindingId,
        external_id: ExternalId,
        sync_date: DateTime<Utc>,
    ) -> CoreResult<()>;
}

/// Advisory locks scoped to the current transaction.
pub trait LockService {
    /// Takes the named lock, or fails with
    /// [`CoreError::LockConflict`](crate::CoreError) when another
    /// transaction holds it. Taking a lock twice in one transaction is a
    /// no-op.
    fn acquire_or_retry(&mut self, name: &str) -> CoreResult<()>;
}

/// Everything a synchronization needs from the host, inside one
/// transaction.
pub trait Session: RecordStore + BindingStore + LockService {
    /// Drains the write notifications collected so far.
    fn take_write_events(&mut self) -> Vec<WriteEvent>;
}
