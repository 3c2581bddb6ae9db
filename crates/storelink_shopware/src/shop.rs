//! Shops.
//!
//! Shops are metadata: they are imported directly, never through jobs,
//! and carry the local settings used by the invoice export.

use crate::models::SHOP;
use serde_json::{json, Value};
use storelink_core::{values, BindingId, BindingStore, Session};
use storelink_engine::mapper::convert;
use storelink_engine::{ImportHooks, ImportMapper, SyncResult};

/// Invoice state that triggers the invoice export when the shop does not
/// say otherwise.
pub const DEFAULT_CREATE_INVOICE_ON: &str = "paid";

/// Imports shops.
pub struct ShopImporter {
    mapper: ImportMapper,
}

impl ShopImporter {
    /// Creates the importer.
    pub fn new() -> Self {
        let mapper = ImportMapper::new(SHOP)
            .direct_with("active", "enabled", convert::boolean)
            .direct("position", "sort_order")
            .rule("name", |_, record| {
                let name = match record.get("name") {
                    Some(Value::String(name)) => name.clone(),
                    _ => "Undefined".to_string(),
                };
                Ok(values::object(json!({ "name": name })))
            })
            .rule_on_create("settings", |_, _| {
                Ok(values::object(json!({
                    "send_invoice_paid_mail": false,
                    "create_invoice_on": DEFAULT_CREATE_INVOICE_ON,
                })))
            });
        Self { mapper }
    }
}

impl Default for ShopImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportHooks for ShopImporter {
    fn model(&self) -> &str {
        SHOP
    }

    fn mapper(&self) -> &ImportMapper {
        &self.mapper
    }

    fn changed_field(&self) -> Option<&str> {
        None
    }
}

/// Reads a setting of a shop binding.
pub fn shop_setting(session: &dyn Session, shop: BindingId, key: &str) -> SyncResult<Option<Value>> {
    Ok(session.binding(shop)?.and_then(|b| b.get(key).cloned()))
}
