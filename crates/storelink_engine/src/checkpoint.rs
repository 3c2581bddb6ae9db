//! Review checkpoints.
//!
//! Records created by an import that a human should look at (new products,
//! new categories) get a checkpoint in state `need_review`.

use crate::error::SyncResult;
use serde_json::json;
use storelink_core::{values, BackendId, RecordId, RecordStore, Session, Values, WriteContext};

/// Model holding checkpoints.
pub const CHECKPOINT_MODEL: &str = "connector.checkpoint";

/// State of a checkpoint awaiting review.
pub const NEED_REVIEW: &str = "need_review";

/// Adds a checkpoint for a record.
pub fn add_checkpoint(
    session: &mut dyn Session,
    backend_id: BackendId,
    model: &str,
    record_id: RecordId,
) -> SyncResult<RecordId> {
    let values: Values = values::object(json!({
        "model_name": model,
        "record_id": record_id.as_u64(),
        "backend_id": backend_id.0,
        "state": NEED_REVIEW,
    }));
    Ok(session.create(CHECKPOINT_MODEL, values, WriteContext::no_export())?)
}

/// Returns the checkpoints of a record.
pub fn checkpoints_for(session: &dyn Session, model: &str, record_id: RecordId) -> SyncResult<Vec<RecordId>> {
    let mut found = Vec::new();
    for id in session.search(CHECKPOINT_MODEL, "record_id", &json!(record_id.as_u64()))? {
        let matches = session
            .browse(CHECKPOINT_MODEL, id)?
            .is_some_and(|c| values::get_str(&c.values, "model_name") == Some(model));
        if matches {
            found.push(id);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storelink_core::Database;

    #[test]
    fn checkpoint_round_trip() {
        let db = Database::open_in_memory();
        let mut txn = db.begin();
        let id = add_checkpoint(&mut txn, BackendId::new(1), "product.product", RecordId::new(8)).unwrap();

        assert_eq!(checkpoints_for(&txn, "product.product", RecordId::new(8)).unwrap(), vec![id]);
        assert!(checkpoints_for(&txn, "product.category", RecordId::new(8)).unwrap().is_empty());
        let record = txn.browse(CHECKPOINT_MODEL, id).unwrap().unwrap();
        assert_eq!(record.get("state"), Some(&json!(NEED_REVIEW)));
    }
}
