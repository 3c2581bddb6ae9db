//! Invoice export.
//!
//! When an invoice reaches the state the shop is configured for, it gets a
//! binding and an export job. The export creates the invoice of the sale
//! order on the shop with the quantities of the lines the shop knows.

use crate::models::{local, INVOICE, SALE_ORDER};
use crate::shop::{shop_setting, DEFAULT_CREATE_INVOICE_ON};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use storelink_core::{
    values, BindingId, BindingStore, ExternalId, RecordStore, Values, WriteEvent, WriteTarget,
};
use storelink_engine::jobs::JobRequest;
use storelink_engine::{
    BoundRecord, ExportHooks, SearchFilter, SyncContext, SyncError, SyncResult, WriteListener,
};
use tracing::debug;

/// Comment attached to exported invoices.
pub const INVOICE_COMMENT: &str = "Invoice Created";

fn sale_order(ctx: &SyncContext<'_>, invoice: &BoundRecord) -> SyncResult<BoundRecord> {
    let sale = invoice
        .get("shopware_order_id")
        .and_then(Value::as_u64)
        .map(BindingId::new)
        .ok_or_else(|| SyncError::failed(format!("invoice {} is not linked to a sale order", invoice.id())))?;
    ctx.binder(SALE_ORDER)?.browse(&*ctx.session, sale)
}

/// Sums the invoiced quantities per order line known by the shop.
///
/// Invoice lines whose product has no line on the sale order are left out,
/// so lines added by hand do not block the export.
pub fn invoice_items(invoice: &BoundRecord, sale: &BoundRecord) -> Values {
    let order_lines = match sale.get("order_lines") {
        Some(Value::Array(lines)) => lines.as_slice(),
        _ => &[][..],
    };
    let invoice_lines = match invoice.get("lines") {
        Some(Value::Array(lines)) => lines.as_slice(),
        _ => &[][..],
    };
    let mut items: BTreeMap<String, f64> = BTreeMap::new();
    for line in invoice_lines {
        let product = line.get("product_id");
        let order_line = order_lines
            .iter()
            .find(|order_line| order_line.get("product_id") == product);
        let Some(item) = order_line
            .and_then(|l| l.get("shopware_id"))
            .and_then(ExternalId::from_value)
        else {
            continue;
        };
        let qty = line.get("quantity").and_then(Value::as_f64).unwrap_or(0.0);
        *items.entry(item.to_string()).or_insert(0.0) += qty;
    }
    items.into_iter().map(|(item, qty)| (item, json!(qty))).collect()
}

/// Exports invoices.
#[derive(Debug, Default)]
pub struct InvoiceExporter;

impl ExportHooks for InvoiceExporter {
    fn model(&self) -> &str {
        INVOICE
    }

    fn payload(
        &self,
        ctx: &mut SyncContext<'_>,
        bound: &BoundRecord,
        _fields: Option<&[String]>,
    ) -> SyncResult<Values> {
        let sale = sale_order(ctx, bound)?;
        let order = sale.external_id().cloned().ok_or_else(|| {
            SyncError::failed(format!("sale order {} has no Shopware id", sale.id()))
        })?;
        let notify = match sale.get("shop_id").and_then(Value::as_u64) {
            Some(shop) => shop_setting(&*ctx.session, BindingId::new(shop), "send_invoice_paid_mail")?
                .is_some_and(|v| values::is_truthy(&v)),
            None => false,
        };
        Ok(values::object(json!({
            "orderId": order,
            "items": invoice_items(bound, &sale),
            "comment": INVOICE_COMMENT,
            "notify": notify,
            "includeComment": false,
        })))
    }

    fn create(
        &self,
        ctx: &mut SyncContext<'_>,
        _bound: &BoundRecord,
        payload: &Values,
    ) -> SyncResult<Option<ExternalId>> {
        if !payload.get("items").is_some_and(values::is_truthy) {
            // no line of the invoice belongs to the sale order
            return Ok(None);
        }
        ctx.env.adapter(INVOICE)?.create(payload).map(Some)
    }

    /// Finds the invoice of the sale order when the shop already has one.
    fn reconcile(&self, ctx: &mut SyncContext<'_>, bound: &BoundRecord) -> SyncResult<Option<ExternalId>> {
        let sale = sale_order(ctx, bound)?;
        if invoice_items(bound, &sale).is_empty() {
            // nothing was sent, nothing to find
            return Ok(None);
        }
        let Some(order_id) = sale.get("shopware_order_id").cloned() else {
            return Ok(None);
        };
        let filter = SearchFilter::new().with_condition("order_id", order_id);
        let invoices = ctx.env.adapter(INVOICE)?.search_read(&filter)?;
        debug!(sale = %sale.id(), found = invoices.len(), "searching existing invoice");
        match invoices.as_slice() {
            [single] => Ok(single.get("increment_id").and_then(ExternalId::from_value)),
            _ => Ok(None),
        }
    }
}

/// Creates invoice bindings when an invoice reaches the state its shop
/// exports invoices on, and schedules their export.
#[derive(Debug, Default)]
pub struct InvoiceListener;

impl WriteListener for InvoiceListener {
    fn on_write(&self, ctx: &mut SyncContext<'_>, event: &WriteEvent) -> SyncResult<()> {
        if event.context.no_export || !event.touches(&["state"]) {
            return Ok(());
        }
        let WriteTarget::Record(invoice_id) = event.target else {
            return Ok(());
        };
        let Some(invoice) = ctx.session.browse(local::INVOICE, invoice_id)? else {
            return Ok(());
        };
        let Some(sale_id) = values::get_record_id(&invoice.values, "sale_order_id") else {
            return Ok(());
        };
        let backend = ctx.backend_id();
        let Some(sale) = ctx.session.find_binding_by_record(backend, SALE_ORDER, sale_id)? else {
            return Ok(());
        };
        if ctx
            .session
            .find_binding_by_record(backend, INVOICE, invoice_id)?
            .is_some()
        {
            return Ok(());
        }

        // the payment method of the order overrides the shop
        let sale_setting = ctx
            .session
            .browse(local::SALE_ORDER, sale_id)?
            .and_then(|order| values::get_str(&order.values, "create_invoice_on").map(str::to_string));
        let create_on = match sale_setting {
            Some(state) => state,
            None => match sale.get("shop_id").and_then(Value::as_u64) {
                Some(shop) => shop_setting(&*ctx.session, BindingId::new(shop), "create_invoice_on")?
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| DEFAULT_CREATE_INVOICE_ON.to_string()),
                None => DEFAULT_CREATE_INVOICE_ON.to_string(),
            },
        };
        if values::get_str(&invoice.values, "state") != Some(create_on.as_str()) {
            return Ok(());
        }

        let binding_id = ctx.binder(INVOICE)?.create_binding(
            ctx.session,
            values::object(json!({
                "record_id": invoice_id.as_u64(),
                "shopware_order_id": sale.id.as_u64(),
            })),
        )?;
        let job = ctx.schedule(JobRequest::export_record(backend, INVOICE, binding_id, None));
        debug!(%invoice_id, %binding_id, %job, "invoice export scheduled");
        Ok(())
    }
}
