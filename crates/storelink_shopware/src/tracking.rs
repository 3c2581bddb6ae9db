//! Tracking numbers of delivery orders.
//!
//! Setting a tracking reference on a picking bound to a shipment schedules
//! an export adding the track to the shipment.

use crate::models::{local, PICKING, SALE_ORDER};
use serde_json::{json, Value};
use storelink_core::{
    values, BindingId, BindingStore, ExternalId, Record, RecordStore, Values, WriteEvent, WriteTarget,
};
use storelink_engine::jobs::JobRequest;
use storelink_engine::{BoundRecord, ExportHooks, SyncContext, SyncError, SyncResult, WriteListener};
use tracing::debug;

/// Priority of tracking exports, after the exports of the orders.
pub const TRACKING_EXPORT_PRIORITY: u32 = 20;

/// Carrier field naming the remote carrier code.
pub const CARRIER_CODE_FIELD: &str = "shopware_code";

/// Carrier field disabling the export of tracking numbers.
pub const CARRIER_EXPORT_FIELD: &str = "shopware_export_tracking";

fn picking_name(bound: &BoundRecord) -> String {
    bound
        .get_str("name")
        .map(str::to_string)
        .unwrap_or_else(|| bound.id().to_string())
}

fn carrier(ctx: &SyncContext<'_>, bound: &BoundRecord) -> SyncResult<Option<Record>> {
    match bound.get_record_id("carrier_id") {
        Some(id) => Ok(ctx.session.browse(local::CARRIER, id)?),
        None => Ok(None),
    }
}

fn sale_order(ctx: &SyncContext<'_>, bound: &BoundRecord) -> SyncResult<Option<BoundRecord>> {
    match bound.get("shopware_order_id").and_then(Value::as_u64) {
        Some(sale) => Ok(Some(ctx.binder(SALE_ORDER)?.browse(&*ctx.session, BindingId::new(sale))?)),
        None => Ok(None),
    }
}

/// Splits the carrier code: the remote code is the part before `_`, the
/// rest only makes local codes unique.
pub fn carrier_code(code: &str) -> &str {
    code.split('_').next().unwrap_or(code)
}

/// Exports the tracking number of a picking.
#[derive(Debug, Default)]
pub struct TrackingExporter;

impl ExportHooks for TrackingExporter {
    fn model(&self) -> &str {
        PICKING
    }

    fn skip_reason(&self, ctx: &mut SyncContext<'_>, bound: &BoundRecord) -> SyncResult<Option<String>> {
        let name = picking_name(bound);
        let Some(carrier) = carrier(ctx, bound)? else {
            return Err(SyncError::failed(format!("The carrier is missing on the picking {name}.")));
        };
        let exports = carrier.get(CARRIER_EXPORT_FIELD).map_or(true, values::is_truthy);
        if !exports {
            let carrier_name = values::get_str(&carrier.values, "name").unwrap_or_default();
            return Ok(Some(format!(
                "The carrier {carrier_name} does not export tracking numbers."
            )));
        }
        if !bound.is_set("carrier_tracking_ref") {
            return Ok(Some("No tracking number to send.".to_string()));
        }
        let has_sale = match sale_order(ctx, bound)? {
            Some(sale) => sale.external_id().is_some(),
            None => false,
        };
        if !has_sale {
            return Err(SyncError::failed(format!(
                "No sales order is linked with the picking {name}, can't export the tracking number."
            )));
        }
        if bound.external_id().is_none() {
            return Err(SyncError::failed(format!(
                "The delivery order {name} has no Shopware ID, can't export the tracking number."
            )));
        }
        let state = bound.get_str("state").unwrap_or_default();
        if state != "done" {
            return Err(SyncError::failed(format!(
                "Wrong value for picking state, it must be 'done', found: {state}"
            )));
        }
        if values::get_set(&carrier.values, CARRIER_CODE_FIELD).is_none() {
            return Err(SyncError::failed(
                "Wrong value for the Shopware carrier code defined in the picking.",
            ));
        }
        Ok(None)
    }

    fn payload(
        &self,
        ctx: &mut SyncContext<'_>,
        bound: &BoundRecord,
        _fields: Option<&[String]>,
    ) -> SyncResult<Values> {
        let carrier = carrier(ctx, bound)?
            .ok_or_else(|| SyncError::failed(format!("The carrier is missing on the picking {}.", picking_name(bound))))?;
        let code = values::get_str(&carrier.values, CARRIER_CODE_FIELD).unwrap_or_default();
        Ok(values::object(json!({
            "carrierCode": carrier_code(code),
            "title": values::get_str(&carrier.values, "name").unwrap_or_default(),
            "trackNumber": bound.get("carrier_tracking_ref").cloned().unwrap_or(Value::Null),
        })))
    }

    fn create(
        &self,
        _ctx: &mut SyncContext<'_>,
        bound: &BoundRecord,
        _payload: &Values,
    ) -> SyncResult<Option<ExternalId>> {
        // tracks are only added to shipments that already exist remotely
        Err(SyncError::failed(format!(
            "The delivery order {} has no Shopware ID, can't export the tracking number.",
            picking_name(bound)
        )))
    }

    fn update(
        &self,
        ctx: &mut SyncContext<'_>,
        bound: &BoundRecord,
        external_id: &ExternalId,
        payload: &Values,
    ) -> SyncResult<()> {
        let sale = sale_order(ctx, bound)?
            .and_then(|sale| sale.external_id().cloned())
            .ok_or_else(|| SyncError::failed(format!("No sales order is linked with the picking {}.", picking_name(bound))))?;
        let adapter = ctx.env.adapter(PICKING)?;
        let allowed = adapter.call("carriers", &json!({ "orderId": sale }))?;
        let allowed: Vec<&str> = match &allowed {
            Value::Array(codes) => codes
                .iter()
                .filter_map(|c| c.as_str().or_else(|| c.get("code").and_then(Value::as_str)))
                .collect(),
            _ => Vec::new(),
        };
        let code = values::get_str(payload, "carrierCode").unwrap_or_default();
        if !allowed.contains(&code) {
            return Err(SyncError::failed(format!(
                "The carrier code {code} is not accepted by the shop for this order. Allowed codes are: {}",
                allowed.join(", ")
            )));
        }

        let mut args = values::object(json!({ "id": external_id }));
        values::merge(&mut args, payload.clone());
        adapter.call("addTrack", &Value::Object(args))?;
        debug!(picking = %bound.id(), shipment = %external_id, "tracking number added");
        Ok(())
    }
}

/// Schedules the tracking export when a tracking reference is set on a
/// picking bound to a shipment.
#[derive(Debug, Default)]
pub struct TrackingListener;

impl WriteListener for TrackingListener {
    fn on_write(&self, ctx: &mut SyncContext<'_>, event: &WriteEvent) -> SyncResult<()> {
        if event.context.no_export || !event.touches(&["carrier_tracking_ref"]) {
            return Ok(());
        }
        let WriteTarget::Record(picking_id) = event.target else {
            return Ok(());
        };
        let backend = ctx.backend_id();
        let bindings = ctx.session.bindings_of(backend, PICKING)?;
        for binding in bindings.iter().filter(|b| b.record_id() == Some(picking_id)) {
            let request = JobRequest::export_record(backend, PICKING, binding.id, Some(&["carrier_tracking_ref"][..]))
                .with_priority(TRACKING_EXPORT_PRIORITY);
            let job = ctx.schedule(request);
            debug!(%picking_id, binding = %binding.id, %job, "tracking export scheduled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carrier_code_drops_local_suffix() {
        assert_eq!(carrier_code("dhl_express"), "dhl");
        assert_eq!(carrier_code("ups"), "ups");
        assert_eq!(carrier_code(""), "");
    }
}
