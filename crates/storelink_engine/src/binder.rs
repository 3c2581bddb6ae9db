//! Binder: translation between remote ids and local bindings.

use crate::error::{SyncError, SyncResult};
use chrono::Utc;
use serde_json::Value;
use storelink_core::{
    BackendId, Binding, BindingId, BindingModel, BindingStore, CoreError, ExternalId, NewBinding,
    Record, RecordId, RecordRef, RecordStore, Session, Values, WriteContext,
};
use tracing::debug;

/// Binds remote ids to local bindings of one binding model on one backend.
#[derive(Debug, Clone)]
pub struct Binder {
    backend_id: BackendId,
    model: BindingModel,
}

impl Binder {
    /// Creates a binder.
    pub fn new(backend_id: BackendId, model: BindingModel) -> Self {
        Self { backend_id, model }
    }

    /// Returns the binding model.
    pub fn model(&self) -> &BindingModel {
        &self.model
    }

    /// Returns the backend id.
    pub fn backend_id(&self) -> BackendId {
        self.backend_id
    }

    /// Returns the binding for a remote id.
    pub fn binding_for(&self, session: &dyn Session, external_id: &ExternalId) -> SyncResult<Option<Binding>> {
        Ok(session.find_binding_by_external(self.backend_id, &self.model.name, external_id)?)
    }

    /// Returns the binding id for a remote id.
    pub fn to_internal(&self, session: &dyn Session, external_id: &ExternalId) -> SyncResult<Option<BindingId>> {
        Ok(self.binding_for(session, external_id)?.map(|b| b.id))
    }

    /// Returns the wrapped record id for a remote id.
    ///
    /// Standalone bindings wrap nothing and yield `None`; use
    /// [`Binder::to_internal`] for them.
    pub fn to_record(&self, session: &dyn Session, external_id: &ExternalId) -> SyncResult<Option<RecordId>> {
        Ok(self
            .binding_for(session, external_id)?
            .and_then(|b| b.record_id()))
    }

    /// Returns the remote id of a binding.
    pub fn to_external(&self, session: &dyn Session, binding_id: BindingId) -> SyncResult<Option<ExternalId>> {
        Ok(session.binding(binding_id)?.and_then(|b| b.external_id))
    }

    /// Returns the remote id bound to a local record.
    pub fn to_external_for_record(
        &self,
        session: &dyn Session,
        record_id: RecordId,
    ) -> SyncResult<Option<ExternalId>> {
        Ok(session
            .find_binding_by_record(self.backend_id, &self.model.name, record_id)?
            .and_then(|b| b.external_id))
    }

    /// Returns the record wrapped by a binding.
    pub fn unwrap_binding(&self, session: &dyn Session, binding_id: BindingId) -> SyncResult<Option<RecordId>> {
        Ok(session.binding(binding_id)?.and_then(|b| b.record_id()))
    }

    /// Associates `external_id` with a binding and stamps the sync date.
    pub fn bind(&self, session: &mut dyn Session, external_id: &ExternalId, binding_id: BindingId) -> SyncResult<()> {
        debug!(model = %self.model.name, %binding_id, %external_id, "bind");
        session.mark_synced(binding_id, external_id.clone(), Utc::now())?;
        Ok(())
    }

    /// Loads a binding together with its wrapped record.
    pub fn browse(&self, session: &dyn Session, binding_id: BindingId) -> SyncResult<BoundRecord> {
        let binding = session
            .binding(binding_id)?
            .ok_or(CoreError::BindingNotFound {
                id: binding_id.as_u64(),
            })?;
        let record = match &binding.record {
            Some(r) => session.browse(&r.model, r.id)?,
            None => None,
        };
        Ok(BoundRecord { binding, record })
    }

    /// Creates a binding from mapped values.
    ///
    /// Values are split between the wrapped record and the binding. When the
    /// values carry a `record_id`, the existing record is bound (and updated
    /// with the record half) instead of creating a new one.
    pub fn create_binding(&self, session: &mut dyn Session, values: Values) -> SyncResult<BindingId> {
        let ctx = WriteContext::no_export();
        let (record_values, binding_values, link) = self.model.split(values);
        let record = match &self.model.target {
            Some(target) => {
                let id = match link {
                    Some(id) => {
                        if !record_values.is_empty() {
                            session.write(target, id, record_values, ctx)?;
                        }
                        id
                    }
                    None => session.create(target, record_values, ctx)?,
                };
                Some(RecordRef::new(target.clone(), id))
            }
            None => None,
        };
        let binding = NewBinding {
            backend_id: self.backend_id,
            model: self.model.name.clone(),
            external_id: None,
            record,
            data: binding_values,
        };
        Ok(session.insert_binding(binding, &self.model, ctx)?)
    }

    /// Writes mapped values onto an existing binding and its record.
    pub fn update_binding(&self, session: &mut dyn Session, binding: &Binding, values: Values) -> SyncResult<()> {
        let ctx = WriteContext::no_export();
        let (record_values, binding_values, _) = self.model.split(values);
        if let Some(record) = &binding.record {
            if !record_values.is_empty() {
                session.write(&record.model, record.id, record_values, ctx)?;
            }
        } else if !record_values.is_empty() {
            return Err(SyncError::invalid_data(format!(
                "{} has no record to hold {:?}",
                binding.id,
                record_values.keys().collect::<Vec<_>>()
            )));
        }
        if !binding_values.is_empty() {
            session.write_binding(binding.id, binding_values, ctx)?;
        }
        Ok(())
    }
}

/// A binding with its wrapped record loaded.
///
/// Field reads look at the binding's own fields first, then at the record.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundRecord {
    /// The binding.
    pub binding: Binding,
    /// The wrapped record, `None` for standalone bindings.
    pub record: Option<Record>,
}

impl BoundRecord {
    /// Returns the binding id.
    pub fn id(&self) -> BindingId {
        self.binding.id
    }

    /// Returns the remote id, if exported.
    pub fn external_id(&self) -> Option<&ExternalId> {
        self.binding.external_id.as_ref()
    }

    /// Returns the wrapped record id.
    pub fn record_id(&self) -> Option<RecordId> {
        self.binding.record_id()
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.binding
            .get(field)
            .or_else(|| self.record.as_ref().and_then(|r| r.get(field)))
    }

    /// Returns a string field.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Returns a field as a record reference.
    pub fn get_record_id(&self, field: &str) -> Option<RecordId> {
        self.get(field)
            .and_then(Value::as_u64)
            .filter(|id| *id != 0)
            .map(RecordId::new)
    }

    /// Returns true when the field is set and truthy.
    pub fn is_set(&self, field: &str) -> bool {
        self.get(field).is_some_and(storelink_core::values::is_truthy)
    }
}
