//! Transactions over the in-memory database.

use crate::binding::{Binding, BindingModel, NewBinding};
use crate::database::Shared;
use crate::error::{CoreError, CoreResult};
use crate::record::{Record, WriteContext, WriteEvent, WriteTarget};
use crate::store::{BindingStore, LockService, RecordStore, Session};
use crate::types::{BackendId, BindingId, ExternalId, RecordId, TransactionId};
use crate::values::{self, Values};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// An active transaction.
///
/// Writes are staged and visible to this transaction only. Commit publishes
/// them at once; abort or drop discards them. Advisory locks taken through
/// [`LockService`] are released in every case.
#[derive(Debug)]
pub struct Transaction {
    shared: Arc<Shared>,
    id: TransactionId,
    state: TransactionState,
    /// Staged records: (model, id) -> full values after the write.
    records: HashMap<(String, RecordId), Values>,
    /// Staged bindings, full copies.
    bindings: BTreeMap<BindingId, Binding>,
    events: Vec<WriteEvent>,
    locks: Vec<String>,
}

impl Transaction {
    pub(crate) fn new(shared: Arc<Shared>, id: TransactionId) -> Self {
        Self {
            shared,
            id,
            state: TransactionState::Active,
            records: HashMap::new(),
            bindings: BTreeMap::new(),
            events: Vec::new(),
            locks: Vec::new(),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Returns the number of staged record and binding writes.
    pub fn pending_writes(&self) -> usize {
        self.records.len() + self.bindings.len()
    }

    /// Publishes the staged writes.
    ///
    /// Binding uniqueness is checked again against the committed state; on
    /// a violation nothing is published and the transaction is aborted.
    pub fn commit(mut self) -> CoreResult<()> {
        self.ensure_active()?;
        let result = self.publish();
        self.state = if result.is_ok() {
            TransactionState::Committed
        } else {
            TransactionState::Aborted
        };
        self.release_locks();
        debug!(txn = %self.id, ok = result.is_ok(), "transaction committed");
        result
    }

    /// Discards the staged writes.
    pub fn abort(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        if self.is_active() {
            self.records.clear();
            self.bindings.clear();
            self.events.clear();
            self.state = TransactionState::Aborted;
            self.release_locks();
            debug!(txn = %self.id, "transaction aborted");
        }
    }

    fn publish(&mut self) -> CoreResult<()> {
        let one_per_record = self.shared.one_per_record.read().clone();
        let mut tables = self.shared.tables.write();
        for candidate in self.bindings.values() {
            let unique_record = one_per_record.contains(&candidate.model);
            for existing in tables.bindings.values() {
                if existing.id != candidate.id && !self.bindings.contains_key(&existing.id) {
                    check_unique(existing, candidate, unique_record)?;
                }
            }
        }
        for ((model, id), values) in std::mem::take(&mut self.records) {
            tables.records.entry(model).or_default().insert(id, values);
        }
        for (id, binding) in std::mem::take(&mut self.bindings) {
            tables.bindings.insert(id, binding);
        }
        Ok(())
    }

    fn release_locks(&mut self) {
        if self.locks.is_empty() {
            return;
        }
        let mut locks = self.shared.locks.lock();
        for name in self.locks.drain(..) {
            locks.remove(&name);
        }
    }

    fn ensure_active(&self) -> CoreResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CoreError::invalid_operation(format!(
                "transaction {} is {:?}",
                self.id, self.state
            )))
        }
    }

    fn current_values(&self, model: &str, id: RecordId) -> Option<Values> {
        if let Some(values) = self.records.get(&(model.to_string(), id)) {
            return Some(values.clone());
        }
        self.shared
            .tables
            .read()
            .records
            .get(model)
            .and_then(|rows| rows.get(&id))
            .cloned()
    }

    fn current_binding(&self, id: BindingId) -> Option<Binding> {
        if let Some(binding) = self.bindings.get(&id) {
            return Some(binding.clone());
        }
        self.shared.tables.read().bindings.get(&id).cloned()
    }

    /// Every binding as seen from this transaction, ordered by id.
    fn visible_bindings(&self) -> Vec<Binding> {
        let tables = self.shared.tables.read();
        let mut merged: BTreeMap<BindingId, Binding> = tables.bindings.clone();
        for (id, binding) in &self.bindings {
            merged.insert(*id, binding.clone());
        }
        merged.into_values().collect()
    }

    fn check_binding(&self, candidate: &Binding) -> CoreResult<()> {
        let unique_record = self.shared.one_per_record.read().contains(&candidate.model);
        for existing in self.visible_bindings() {
            if existing.id != candidate.id {
                check_unique(&existing, candidate, unique_record)?;
            }
        }
        Ok(())
    }

    fn push_event(&mut self, model: &str, target: WriteTarget, fields: &Values, created: bool, ctx: WriteContext) {
        self.events.push(WriteEvent {
            model: model.to_string(),
            target,
            fields: fields.keys().cloned().collect(),
            created,
            context: ctx,
        });
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.discard();
    }
}

fn check_unique(existing: &Binding, candidate: &Binding, unique_record: bool) -> CoreResult<()> {
    if existing.backend_id != candidate.backend_id || existing.model != candidate.model {
        return Ok(());
    }
    if let (Some(a), Some(b)) = (&existing.external_id, &candidate.external_id) {
        if a == b {
            return Err(CoreError::DuplicateBinding {
                model: candidate.model.clone(),
                backend_id: candidate.backend_id,
                detail: format!("external id {b} is already bound"),
            });
        }
    }
    if unique_record {
        if let (Some(a), Some(b)) = (existing.record_id(), candidate.record_id()) {
            if a == b {
                return Err(CoreError::DuplicateBinding {
                    model: candidate.model.clone(),
                    backend_id: candidate.backend_id,
                    detail: format!("record {b} is already bound"),
                });
            }
        }
    }
    Ok(())
}

impl RecordStore for Transaction {
    fn create(&mut self, model: &str, values: Values, ctx: WriteContext) -> CoreResult<RecordId> {
        self.ensure_active()?;
        let id = self.shared.next_record_id();
        self.push_event(model, WriteTarget::Record(id), &values, true, ctx);
        self.records.insert((model.to_string(), id), values);
        Ok(id)
    }

    fn browse(&self, model: &str, id: RecordId) -> CoreResult<Option<Record>> {
        Ok(self.current_values(model, id).map(|values| Record {
            model: model.to_string(),
            id,
            values,
        }))
    }

    fn write(
        &mut self,
        model: &str,
        id: RecordId,
        values: Values,
        ctx: WriteContext,
    ) -> CoreResult<()> {
        self.ensure_active()?;
        let mut current = self
            .current_values(model, id)
            .ok_or_else(|| CoreError::RecordNotFound {
                model: model.to_string(),
                id,
            })?;
        self.push_event(model, WriteTarget::Record(id), &values, false, ctx);
        values::merge(&mut current, values);
        self.records.insert((model.to_string(), id), current);
        Ok(())
    }

    fn search(&self, model: &str, field: &str, value: &Value) -> CoreResult<Vec<RecordId>> {
        let mut rows: BTreeMap<RecordId, Values> = self
            .shared
            .tables
            .read()
            .records
            .get(model)
            .cloned()
            .unwrap_or_default();
        for ((staged_model, id), values) in &self.records {
            if staged_model == model {
                rows.insert(*id, values.clone());
            }
        }
        Ok(rows
            .into_iter()
            .filter(|(_, values)| values.get(field) == Some(value))
            .map(|(id, _)| id)
            .collect())
    }
}

impl BindingStore for Transaction {
    fn binding(&self, id: BindingId) -> CoreResult<Option<Binding>> {
        Ok(self.current_binding(id))
    }

    fn find_binding_by_external(
        &self,
        backend_id: BackendId,
        model: &str,
        external_id: &ExternalId,
    ) -> CoreResult<Option<Binding>> {
        Ok(self.visible_bindings().into_iter().find(|b| {
            b.backend_id == backend_id
                && b.model == model
                && b.external_id.as_ref() == Some(external_id)
        }))
    }

    fn find_binding_by_record(
        &self,
        backend_id: BackendId,
        model: &str,
        record_id: RecordId,
    ) -> CoreResult<Option<Binding>> {
        Ok(self.visible_bindings().into_iter().find(|b| {
            b.backend_id == backend_id && b.model == model && b.record_id() == Some(record_id)
        }))
    }

    fn bindings_of(&self, backend_id: BackendId, model: &str) -> CoreResult<Vec<Binding>> {
        Ok(self
            .visible_bindings()
            .into_iter()
            .filter(|b| b.backend_id == backend_id && b.model == model)
            .collect())
    }

    fn insert_binding(
        &mut self,
        binding: NewBinding,
        model: &BindingModel,
        ctx: WriteContext,
    ) -> CoreResult<BindingId> {
        self.ensure_active()?;
        if binding.model != model.name {
            return Err(CoreError::invalid_operation(format!(
                "binding for {} inserted with the description of {}",
                binding.model, model.name
            )));
        }
        if let Some(record) = &binding.record {
            if self.current_values(&record.model, record.id).is_none() {
                return Err(CoreError::RecordNotFound {
                    model: record.model.clone(),
                    id: record.id,
                });
            }
        }
        if model.one_per_record {
            self.shared.one_per_record.write().insert(model.name.clone());
        }
        let candidate = Binding {
            id: self.shared.next_binding_id(),
            backend_id: binding.backend_id,
            model: binding.model,
            external_id: binding.external_id,
            record: binding.record,
            sync_date: None,
            data: binding.data,
        };
        self.check_binding(&candidate)?;
        let id = candidate.id;
        let model_name = candidate.model.clone();
        let fields = candidate.data.clone();
        self.push_event(&model_name, WriteTarget::Binding(id), &fields, true, ctx);
        self.bindings.insert(id, candidate);
        Ok(id)
    }

    fn write_binding(&mut self, id: BindingId, data: Values, ctx: WriteContext) -> CoreResult<()> {
        self.ensure_active()?;
        let mut binding = self
            .current_binding(id)
            .ok_or(CoreError::BindingNotFound { id: id.as_u64() })?;
        let model = binding.model.clone();
        self.push_event(&model, WriteTarget::Binding(id), &data, false, ctx);
        values::merge(&mut binding.data, data);
        self.bindings.insert(id, binding);
        Ok(())
    }

    fn mark_synced(
        &mut self,
        id: BindingId,
        external_id: ExternalId,
        sync_date: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.ensure_active()?;
        let mut binding = self
            .current_binding(id)
            .ok_or(CoreError::BindingNotFound { id: id.as_u64() })?;
        binding.external_id = Some(external_id);
        binding.sync_date = Some(sync_date);
        self.check_binding(&binding)?;
        self.bindings.insert(id, binding);
        Ok(())
    }
}

impl LockService for Transaction {
    fn acquire_or_retry(&mut self, name: &str) -> CoreResult<()> {
        self.ensure_active()?;
        let mut locks = self.shared.locks.lock();
        match locks.get(name) {
            Some(owner) if *owner == self.id => Ok(()),
            Some(_) => Err(CoreError::LockConflict {
                name: name.to_string(),
            }),
            None => {
                locks.insert(name.to_string(), self.id);
                drop(locks);
                self.locks.push(name.to_string());
                Ok(())
            }
        }
    }
}

impl Session for Transaction {
    fn take_write_events(&mut self) -> Vec<WriteEvent> {
        std::mem::take(&mut self.events)
    }
}
