//! In-memory database.

use crate::binding::Binding;
use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::transaction::Transaction;
use crate::types::{BackendId, BindingId, RecordId, TransactionId};
use crate::values::Values;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Committed state.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    /// model -> id -> values
    pub(crate) records: HashMap<String, BTreeMap<RecordId, Values>>,
    pub(crate) bindings: BTreeMap<BindingId, Binding>,
}

/// State shared by the database handle and its transactions.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) tables: RwLock<Tables>,
    /// Lock name -> owning transaction.
    pub(crate) locks: Mutex<HashMap<String, TransactionId>>,
    /// Binding models restricted to one binding per record.
    pub(crate) one_per_record: RwLock<HashSet<String>>,
    next_record: AtomicU64,
    next_binding: AtomicU64,
    next_txn: AtomicU64,
}

impl Shared {
    pub(crate) fn next_record_id(&self) -> RecordId {
        RecordId::new(self.next_record.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn next_binding_id(&self) -> BindingId {
        BindingId::new(self.next_binding.fetch_add(1, Ordering::SeqCst))
    }
}

/// An in-memory record and binding store.
///
/// All access goes through transactions. The handle is cheap to clone; clones
/// share the same data.
///
/// # Example
///
/// ```rust
/// use storelink_core::{Database, RecordStore, WriteContext, Values};
///
/// let db = Database::open_in_memory();
/// let id = db
///     .transaction(|txn| txn.create("res.partner", Values::new(), WriteContext::default()))
///     .unwrap();
/// assert!(db.browse("res.partner", id).is_some());
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

impl Database {
    /// Creates an empty database.
    pub fn open_in_memory() -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                locks: Mutex::new(HashMap::new()),
                one_per_record: RwLock::new(HashSet::new()),
                next_record: AtomicU64::new(1),
                next_binding: AtomicU64::new(1),
                next_txn: AtomicU64::new(1),
            }),
        }
    }

    /// Starts a manual transaction.
    ///
    /// Dropping the transaction without committing aborts it.
    pub fn begin(&self) -> Transaction {
        let id = TransactionId(self.shared.next_txn.fetch_add(1, Ordering::SeqCst));
        Transaction::new(Arc::clone(&self.shared), id)
    }

    /// Runs `f` inside a transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and aborts otherwise.
    pub fn transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction) -> Result<T, E>,
        E: From<CoreError>,
    {
        let mut txn = self.begin();
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                txn.abort();
                Err(err)
            }
        }
    }

    /// Reads a committed record.
    pub fn browse(&self, model: &str, id: RecordId) -> Option<Record> {
        let tables = self.shared.tables.read();
        tables
            .records
            .get(model)
            .and_then(|rows| rows.get(&id))
            .map(|values| Record {
                model: model.to_string(),
                id,
                values: values.clone(),
            })
    }

    /// Lists committed records of a model.
    pub fn records(&self, model: &str) -> Vec<Record> {
        let tables = self.shared.tables.read();
        tables
            .records
            .get(model)
            .map(|rows| {
                rows.iter()
                    .map(|(id, values)| Record {
                        model: model.to_string(),
                        id: *id,
                        values: values.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reads a committed binding.
    pub fn binding(&self, id: BindingId) -> Option<Binding> {
        self.shared.tables.read().bindings.get(&id).cloned()
    }

    /// Lists committed bindings of a model for a backend.
    pub fn bindings_of(&self, backend_id: BackendId, model: &str) -> Vec<Binding> {
        self.shared
            .tables
            .read()
            .bindings
            .values()
            .filter(|b| b.backend_id == backend_id && b.model == model)
            .cloned()
            .collect()
    }

    /// Returns the number of committed records of a model.
    pub fn record_count(&self, model: &str) -> usize {
        self.shared
            .tables
            .read()
            .records
            .get(model)
            .map_or(0, BTreeMap::len)
    }

    /// Returns the number of committed bindings across all models.
    pub fn binding_count(&self) -> usize {
        self.shared.tables.read().bindings.len()
    }

    /// Returns true while some transaction holds the named lock.
    pub fn is_locked(&self, name: &str) -> bool {
        self.shared.locks.lock().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RecordStore, WriteContext};
    use serde_json::json;

    fn values(value: serde_json::Value) -> Values {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn closure_commits_on_ok() {
        let db = Database::open_in_memory();
        let id = db
            .transaction(|txn| {
                txn.create("res.partner", values(json!({"name": "A"})), WriteContext::default())
            })
            .unwrap();
        assert_eq!(db.browse("res.partner", id).unwrap().values["name"], json!("A"));
        assert_eq!(db.record_count("res.partner"), 1);
    }

    #[test]
    fn closure_aborts_on_err() {
        let db = Database::open_in_memory();
        let result: CoreResult<()> = db.transaction(|txn| {
            txn.create("res.partner", Values::new(), WriteContext::default())?;
            Err(CoreError::invalid_operation("boom"))
        });
        assert!(result.is_err());
        assert_eq!(db.record_count("res.partner"), 0);
    }

    #[test]
    fn record_ids_are_not_reused() {
        let db = Database::open_in_memory();
        let _ = db.transaction(|txn| -> CoreResult<()> {
            txn.create("a", Values::new(), WriteContext::default())?;
            Err(CoreError::invalid_operation("abort"))
        });
        let id = db
            .transaction(|txn| txn.create("a", Values::new(), WriteContext::default()))
            .unwrap();
        assert_eq!(id, RecordId::new(2));
    }
}
