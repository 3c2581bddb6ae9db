//! Backend operations: the scheduled entry points of a Shopware backend.
//!
//! Each operation is also registered as a job function so it can be
//! scheduled by cron-like callers with `{"now": <timestamp>}` arguments.

use crate::models::{ARTICLE, PARTNER, PARTNER_CATEGORY, PRODUCT_CATEGORY, SHOP};
use crate::product::recompute_stock_qty;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use storelink_core::{timestamp, values, BindingStore, Values};
use storelink_engine::jobs::{JobFunctions, JobRequest};
use storelink_engine::watermark::import_since;
use storelink_engine::{BatchReport, SearchFilter, SyncContext, SyncError, SyncResult};
use tracing::info;
use uuid::Uuid;

/// Imports the shops right away.
pub fn synchronize_metadata(ctx: &mut SyncContext<'_>) -> SyncResult<BatchReport> {
    let batch = ctx.env.batch_importer(SHOP)?;
    let report = batch.run(ctx, &SearchFilter::new())?;
    info!(backend = %ctx.backend_id(), summary = %report.summary(), "metadata synchronized");
    Ok(report)
}

/// Synchronizes the metadata when no shop was imported yet.
///
/// Returns true when a synchronization ran.
pub fn check_structure(ctx: &mut SyncContext<'_>) -> SyncResult<bool> {
    if !ctx.session.bindings_of(ctx.backend_id(), SHOP)?.is_empty() {
        return Ok(false);
    }
    synchronize_metadata(ctx)?;
    Ok(true)
}

/// Schedules the import of every customer group.
pub fn import_customer_groups(ctx: &mut SyncContext<'_>) -> SyncResult<Uuid> {
    check_structure(ctx)?;
    let job = ctx.schedule(JobRequest::import_batch(
        ctx.backend_id(),
        PARTNER_CATEGORY,
        &SearchFilter::new(),
    ));
    Ok(job)
}

/// Schedules, per shop, the import of the customers changed since the last
/// run of the shop.
pub fn import_partners(ctx: &mut SyncContext<'_>, now: DateTime<Utc>) -> SyncResult<Vec<Uuid>> {
    check_structure(ctx)?;
    let mut jobs = Vec::new();
    for shop in ctx.session.bindings_of(ctx.backend_id(), SHOP)? {
        let Some(shop_id) = shop.external_id else {
            continue;
        };
        let conditions = values::object(json!({ "shop_id": shop_id.to_value() }));
        jobs.push(import_since(ctx, PARTNER, &format!("partners:{shop_id}"), conditions, now)?);
    }
    Ok(jobs)
}

/// Schedules the import of the categories changed since the last run.
pub fn import_product_categories(ctx: &mut SyncContext<'_>, now: DateTime<Utc>) -> SyncResult<Uuid> {
    import_since(ctx, PRODUCT_CATEGORY, "product_categories", Values::new(), now)
}

/// Schedules the import of the articles changed since the last run.
pub fn import_articles(ctx: &mut SyncContext<'_>, now: DateTime<Utc>) -> SyncResult<Uuid> {
    import_since(ctx, ARTICLE, "articles", Values::new(), now)
}

/// Recomputes the stock quantities of the products.
pub fn update_product_stock_qty(ctx: &mut SyncContext<'_>) -> SyncResult<usize> {
    let changed = recompute_stock_qty(ctx)?;
    info!(backend = %ctx.backend_id(), changed, "stock quantities updated");
    Ok(changed)
}

fn now_from(args: &Value) -> SyncResult<DateTime<Utc>> {
    match args.get("now") {
        None | Some(Value::Null) => Ok(Utc::now()),
        Some(value) => timestamp::from_value(value)
            .ok_or_else(|| SyncError::failed(format!("invalid date for now: {value}"))),
    }
}

fn synchronize_metadata_job(ctx: &mut SyncContext<'_>, _args: &Value) -> SyncResult<Option<String>> {
    Ok(Some(synchronize_metadata(ctx)?.summary()))
}

fn import_customer_groups_job(ctx: &mut SyncContext<'_>, _args: &Value) -> SyncResult<Option<String>> {
    let job = import_customer_groups(ctx)?;
    Ok(Some(format!("scheduled {job}")))
}

fn import_partners_job(ctx: &mut SyncContext<'_>, args: &Value) -> SyncResult<Option<String>> {
    let jobs = import_partners(ctx, now_from(args)?)?;
    Ok(Some(format!("{} shop(s) scheduled", jobs.len())))
}

fn import_product_categories_job(ctx: &mut SyncContext<'_>, args: &Value) -> SyncResult<Option<String>> {
    let job = import_product_categories(ctx, now_from(args)?)?;
    Ok(Some(format!("scheduled {job}")))
}

fn import_articles_job(ctx: &mut SyncContext<'_>, args: &Value) -> SyncResult<Option<String>> {
    let job = import_articles(ctx, now_from(args)?)?;
    Ok(Some(format!("scheduled {job}")))
}

fn update_product_stock_qty_job(ctx: &mut SyncContext<'_>, _args: &Value) -> SyncResult<Option<String>> {
    let changed = update_product_stock_qty(ctx)?;
    Ok(Some(format!("{changed} product(s) changed")))
}

/// Job functions of a Shopware backend: the standard ones plus the backend
/// operations.
pub fn functions() -> JobFunctions {
    let mut functions = JobFunctions::standard();
    functions
        .register("synchronize_metadata", synchronize_metadata_job)
        .register("import_customer_groups", import_customer_groups_job)
        .register("import_partners", import_partners_job)
        .register("import_product_categories", import_product_categories_job)
        .register("import_articles", import_articles_job)
        .register("update_product_stock_qty", update_product_stock_qty_job);
    functions
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn backend_functions_are_registered() {
        let functions = functions();
        for name in [
            "import_record",
            "import_batch",
            "export_record",
            "synchronize_metadata",
            "import_customer_groups",
            "import_partners",
            "import_product_categories",
            "import_articles",
            "update_product_stock_qty",
        ] {
            assert!(functions.get(name).is_some(), "{name} missing");
        }
    }

    #[test]
    fn now_argument() {
        assert!(now_from(&json!({})).is_ok());
        let at = now_from(&json!({"now": "2024-03-01T10:00:00Z"})).unwrap();
        assert_eq!(timestamp::format(&at), timestamp::format(&timestamp::parse("2024-03-01 10:00:00").unwrap()));
        assert!(now_from(&json!({"now": "yesterday"})).is_err());
    }
}
