//! Deletion of remote records.

use crate::adapter::Adapter;
use crate::error::SyncResult;
use std::sync::Arc;
use storelink_core::ExternalId;
use tracing::info;

/// Deletes records on the remote system.
#[derive(Clone)]
pub struct Deleter {
    adapter: Arc<dyn Adapter>,
}

impl Deleter {
    /// Creates a deleter working on `adapter`.
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }

    /// Deletes one remote record and returns the job message.
    pub fn run(&self, external_id: &ExternalId) -> SyncResult<String> {
        self.adapter.delete(external_id)?;
        info!(%external_id, "deleted on the backend");
        Ok(format!("Record {external_id} deleted on the backend"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Recorded, Recorder, RecordingAdapter};
    use crate::error::SyncError;
    use serde_json::json;

    #[test]
    fn deletes_and_reports() {
        let recorder = Recorder::new();
        recorder.respond("articles", "delete", json!({"id": 4}), Recorded::Ok(json!(true)));
        let deleter = Deleter::new(Arc::new(RecordingAdapter::new("articles", recorder.clone())));

        let message = deleter.run(&ExternalId::Int(4)).unwrap();
        assert_eq!(message, "Record 4 deleted on the backend");
        assert_eq!(recorder.mutation_count(), 1);
    }

    #[test]
    fn missing_record_propagates() {
        let recorder = Recorder::new();
        recorder.respond("articles", "delete", json!({"id": 5}), Recorded::NotFound);
        let deleter = Deleter::new(Arc::new(RecordingAdapter::new("articles", recorder)));
        assert!(matches!(
            deleter.run(&ExternalId::Int(5)),
            Err(SyncError::NotFoundRemotely { .. })
        ));
    }
}
