//! "Import since" watermarks.
//!
//! A watermark remembers, per backend and import kind, from when the next
//! batch import must search. Each run schedules a batch job for the window
//! `[watermark, now]` and moves the watermark to `now` minus a small buffer
//! so records committed late on the remote side are not missed.

use crate::adapter::SearchFilter;
use crate::environment::SyncContext;
use crate::error::SyncResult;
use crate::jobs::JobRequest;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use storelink_core::{timestamp, values, BackendId, RecordStore, Session, Values, WriteContext};
use tracing::info;
use uuid::Uuid;

/// Model holding watermarks.
pub const WATERMARK_MODEL: &str = "connector.watermark";

fn key(backend_id: BackendId, name: &str) -> String {
    format!("{backend_id}:{name}")
}

/// Reads a watermark.
pub fn read_watermark(session: &dyn Session, backend_id: BackendId, name: &str) -> SyncResult<Option<DateTime<Utc>>> {
    let ids = session.search(WATERMARK_MODEL, "key", &json!(key(backend_id, name)))?;
    let Some(id) = ids.first() else {
        return Ok(None);
    };
    Ok(session
        .browse(WATERMARK_MODEL, *id)?
        .and_then(|r| r.get("date").and_then(timestamp::from_value)))
}

/// Stores a watermark, creating it on first use.
pub fn store_watermark(
    session: &mut dyn Session,
    backend_id: BackendId,
    name: &str,
    at: DateTime<Utc>,
) -> SyncResult<()> {
    let key = key(backend_id, name);
    let ctx = WriteContext::no_export();
    let date = values::object(json!({ "date": timestamp::format(&at) }));
    match session.search(WATERMARK_MODEL, "key", &json!(key))?.first() {
        Some(id) => session.write(WATERMARK_MODEL, *id, date, ctx)?,
        None => {
            let mut record = date;
            record.insert("key".into(), json!(key));
            session.create(WATERMARK_MODEL, record, ctx)?;
        }
    }
    Ok(())
}

/// Schedules a batch import of `model` for everything changed since the
/// watermark `name`, then advances the watermark.
///
/// `conditions` narrow the search further, e.g. to one shop.
pub fn import_since(
    ctx: &mut SyncContext<'_>,
    model: &str,
    name: &str,
    conditions: Values,
    now: DateTime<Utc>,
) -> SyncResult<Uuid> {
    let backend_id = ctx.backend_id();
    let from_date = read_watermark(&*ctx.session, backend_id, name)?;
    let filter = SearchFilter {
        conditions,
        ..SearchFilter::between(from_date, Some(now))
    };
    let job = ctx.schedule(JobRequest::import_batch(backend_id, model, &filter));

    let buffer = Duration::from_std(ctx.env.backend().import_delta_buffer()).unwrap_or_else(|_| Duration::zero());
    store_watermark(ctx.session, backend_id, name, now - buffer)?;
    info!(%model, watermark = %name, ?from_date, %now, %job, "import since scheduled");
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use storelink_core::Database;

    #[test]
    fn watermark_store_and_read() {
        let db = Database::open_in_memory();
        let mut txn = db.begin();
        let backend = BackendId::new(1);
        assert_eq!(read_watermark(&txn, backend, "partners").unwrap(), None);

        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store_watermark(&mut txn, backend, "partners", first).unwrap();
        assert_eq!(read_watermark(&txn, backend, "partners").unwrap(), Some(first));

        let second = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        store_watermark(&mut txn, backend, "partners", second).unwrap();
        assert_eq!(read_watermark(&txn, backend, "partners").unwrap(), Some(second));
        assert_eq!(read_watermark(&txn, BackendId::new(2), "partners").unwrap(), None);
        assert_eq!(txn.search(WATERMARK_MODEL, "key", &json!("1:partners")).unwrap().len(), 1);
    }
}
