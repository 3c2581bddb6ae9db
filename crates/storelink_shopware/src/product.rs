//! Articles, variants and the inventory export.
//!
//! An article groups variants. Articles are kept as standalone bindings;
//! each variant is a local product. Importing an article schedules the
//! import of its variants, and a variant depends on its article.

use crate::models::{local, ARTICLE, INVENTORY_FIELDS, PRODUCT, PRODUCT_CATEGORY};
use serde_json::{json, Value};
use storelink_core::{
    values, Binding, BindingStore, ExternalId, RecordStore, Values, WriteContext, WriteEvent,
    WriteTarget,
};
use storelink_engine::checkpoint::add_checkpoint;
use storelink_engine::jobs::JobRequest;
use storelink_engine::mapper::convert;
use storelink_engine::{
    BoundRecord, ExportHooks, ImportHooks, ImportMapper, SyncContext, SyncError, SyncResult,
    WriteListener,
};
use tracing::debug;

/// Priority of inventory exports, after the regular jobs.
pub const INVENTORY_EXPORT_PRIORITY: u32 = 20;

/// Stock field used when the backend names none.
pub const DEFAULT_STOCK_FIELD: &str = "virtual_available";

fn category_ids(record: &Values) -> Vec<ExternalId> {
    match record.get("categories") {
        Some(Value::Array(categories)) => categories
            .iter()
            .filter_map(|c| c.get("id").and_then(ExternalId::from_value))
            .collect(),
        _ => Vec::new(),
    }
}

/// Imports articles.
pub struct ArticleImporter {
    mapper: ImportMapper,
}

impl ArticleImporter {
    /// Creates the importer.
    pub fn new() -> Self {
        let mapper = ImportMapper::new(ARTICLE)
            .direct("name", "name")
            .direct("description", "description")
            .direct("descriptionLong", "description_long")
            .direct_with("active", "active", convert::boolean)
            .direct_with("changed", "changed", convert::datetime)
            // the first category is the main one
            .rule("categories", |ctx, record| {
                let binder = ctx.binder(PRODUCT_CATEGORY)?;
                let mut ids = Vec::new();
                for category in category_ids(record) {
                    match binder.to_record(ctx.session, &category)? {
                        Some(id) => ids.push(id.as_u64()),
                        None => {
                            return Err(SyncError::mapping(format!(
                                "The product category with shopware id {category} is not imported."
                            )))
                        }
                    }
                }
                let main = if ids.is_empty() {
                    ctx.backend().default_category_id.map(|id| id.as_u64())
                } else {
                    Some(ids.remove(0))
                };
                let mut out = values::object(json!({ "categ_ids": ids }));
                if let Some(main) = main {
                    out.insert("categ_id".into(), json!(main));
                }
                Ok(out)
            });
        Self { mapper }
    }
}

impl Default for ArticleImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportHooks for ArticleImporter {
    fn model(&self) -> &str {
        ARTICLE
    }

    fn mapper(&self) -> &ImportMapper {
        &self.mapper
    }

    fn import_dependencies(&self, ctx: &mut SyncContext<'_>, record: &Values) -> SyncResult<()> {
        for category in category_ids(record) {
            ctx.import_dependency(&category, PRODUCT_CATEGORY, false)?;
        }
        Ok(())
    }

    /// Schedules the import of the main variant and the other variants.
    fn after_import(&self, ctx: &mut SyncContext<'_>, _binding: &Binding, record: &Values) -> SyncResult<()> {
        let mut variants: Vec<ExternalId> = Vec::new();
        let main = record.get("mainDetail").and_then(|d| d.get("id"));
        let details: Vec<&Value> = match record.get("details") {
            Some(Value::Array(details)) => details.iter().filter_map(|d| d.get("id")).collect(),
            _ => Vec::new(),
        };
        for id in main.into_iter().chain(details).filter_map(ExternalId::from_value) {
            if !variants.contains(&id) {
                variants.push(id);
            }
        }
        for variant in &variants {
            let job = ctx.schedule(JobRequest::import_record(ctx.backend_id(), PRODUCT, variant, false));
            debug!(%variant, %job, "variant import scheduled");
        }
        Ok(())
    }
}

/// Imports variants as products.
pub struct ProductImporter {
    mapper: ImportMapper,
}

impl ProductImporter {
    /// Creates the importer.
    pub fn new() -> Self {
        let mapper = ImportMapper::new(PRODUCT)
            .direct("number", "default_code")
            .direct("additionalText", "description_sale")
            .direct_with("active", "active", convert::boolean)
            .direct("ean", "ean13")
            .direct_with("weight", "weight", convert::number)
            // only the EK price always exists
            .rule("price", |_, record| {
                let prices = match record.get("prices") {
                    Some(Value::Array(prices)) => prices.as_slice(),
                    _ => &[][..],
                };
                let ek = prices.iter().find(|p| {
                    p.get("from").and_then(Value::as_i64) == Some(1)
                        && p.get("customerGroup")
                            .and_then(|g| g.get("key"))
                            .and_then(Value::as_str)
                            == Some("EK")
                });
                match ek.and_then(|p| p.get("price")) {
                    Some(price) => Ok(values::object(json!({ "list_price": convert::number(price) }))),
                    None => Err(SyncError::mapping(format!(
                        "Could not store the price for the article detail with shopware id {}",
                        record.get("id").map(ToString::to_string).unwrap_or_default()
                    ))),
                }
            })
            .rule("article", |ctx, record| {
                let article_id = record.get("articleId").and_then(ExternalId::from_value);
                let article = match &article_id {
                    Some(id) => ctx.binder(ARTICLE)?.binding_for(ctx.session, id)?,
                    None => None,
                };
                let Some(article) = article else {
                    return Err(SyncError::mapping(format!(
                        "The shopware article with shopware id {} does not exist",
                        article_id.map(|id| id.to_string()).unwrap_or_default()
                    )));
                };
                let field = |name: &str| article.get(name).cloned().unwrap_or(Value::Null);
                Ok(values::object(json!({
                    "name": field("name"),
                    "description": field("description_long"),
                    "shopware_article_id": article.id.as_u64(),
                    "categ_ids": field("categ_ids"),
                    "categ_id": field("categ_id"),
                    "changed": field("changed"),
                })))
            })
            .rule_on_create("inventory", |_, _| {
                Ok(values::object(json!({
                    "manage_stock": "use_default",
                    "backorders": "use_default",
                    "no_stock_sync": false,
                })))
            });
        Self { mapper }
    }
}

impl Default for ProductImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportHooks for ProductImporter {
    fn model(&self) -> &str {
        PRODUCT
    }

    fn mapper(&self) -> &ImportMapper {
        &self.mapper
    }

    // variants carry the date of their article, not their own
    fn changed_field(&self) -> Option<&str> {
        None
    }

    fn import_dependencies(&self, ctx: &mut SyncContext<'_>, record: &Values) -> SyncResult<()> {
        ctx.import_dependency_value(record.get("articleId"), ARTICLE, false)
    }

    fn after_create(&self, ctx: &mut SyncContext<'_>, binding: &Binding) -> SyncResult<()> {
        if let Some(record_id) = binding.record_id() {
            add_checkpoint(ctx.session, ctx.env.backend_id(), local::PRODUCT, record_id)?;
        }
        Ok(())
    }
}

fn backorders_code(value: Option<&str>) -> i64 {
    match value {
        Some("yes") => 1,
        Some("yes-and-notification") => 2,
        _ => 0,
    }
}

/// Builds the inventory payload for the changed fields.
pub fn inventory_payload(bound: &BoundRecord, fields: Option<&[String]>) -> Values {
    let wanted = |field: &str| fields.map_or(true, |f| f.iter().any(|name| name == field));
    let mut payload = Values::new();
    if wanted("shopware_qty") {
        payload.insert("inStock".into(), bound.get("shopware_qty").cloned().unwrap_or(json!(0)));
    }
    if wanted("manage_stock") {
        let manage = bound.get_str("manage_stock");
        payload.insert("manage_stock".into(), json!(i64::from(manage == Some("yes"))));
        payload.insert(
            "use_config_manage_stock".into(),
            json!(i64::from(manage.map_or(true, |m| m == "use_default"))),
        );
    }
    if wanted("backorders") {
        let backorders = bound.get_str("backorders");
        payload.insert("backorders".into(), json!(backorders_code(backorders)));
        payload.insert(
            "use_config_backorders".into(),
            json!(i64::from(backorders.map_or(true, |b| b == "use_default"))),
        );
    }
    payload
}

/// Exports the stock quantity and stock settings of a product.
#[derive(Debug, Default)]
pub struct InventoryExporter;

impl ExportHooks for InventoryExporter {
    fn model(&self) -> &str {
        PRODUCT
    }

    fn skip_reason(&self, _ctx: &mut SyncContext<'_>, bound: &BoundRecord) -> SyncResult<Option<String>> {
        if bound.external_id().is_none() {
            return Err(SyncError::failed(format!(
                "product {} has no Shopware id, its inventory cannot be exported",
                bound.id()
            )));
        }
        Ok(None)
    }

    fn payload(
        &self,
        _ctx: &mut SyncContext<'_>,
        bound: &BoundRecord,
        fields: Option<&[String]>,
    ) -> SyncResult<Values> {
        Ok(inventory_payload(bound, fields))
    }
}

/// Schedules an inventory export when inventory fields of a product
/// binding change.
#[derive(Debug, Default)]
pub struct InventoryListener;

impl WriteListener for InventoryListener {
    fn on_write(&self, ctx: &mut SyncContext<'_>, event: &WriteEvent) -> SyncResult<()> {
        if event.context.no_export {
            return Ok(());
        }
        let WriteTarget::Binding(binding_id) = event.target else {
            return Ok(());
        };
        let fields: Vec<&str> = event
            .fields
            .iter()
            .map(String::as_str)
            .filter(|f| INVENTORY_FIELDS.contains(f))
            .collect();
        if fields.is_empty() {
            return Ok(());
        }
        let Some(binding) = ctx.session.binding(binding_id)? else {
            return Ok(());
        };
        if binding.get("no_stock_sync").is_some_and(values::is_truthy) {
            return Ok(());
        }
        let request = JobRequest::export_record(ctx.backend_id(), PRODUCT, binding_id, Some(&fields[..]))
            .with_priority(INVENTORY_EXPORT_PRIORITY);
        let job = ctx.schedule(request);
        debug!(%binding_id, ?fields, %job, "inventory export scheduled");
        Ok(())
    }
}

/// Recomputes the quantity to send for every product of the backend.
///
/// The quantity is read from the stock field configured on the backend.
/// Products whose quantity changed get it written on their binding, which
/// schedules their inventory export. Returns the number of changed
/// products.
pub fn recompute_stock_qty(ctx: &mut SyncContext<'_>) -> SyncResult<usize> {
    let backend = ctx.env.backend();
    let stock_field = if backend.product_stock_field.is_empty() {
        DEFAULT_STOCK_FIELD
    } else {
        backend.product_stock_field.as_str()
    };
    let mut changed = 0;
    for binding in ctx.session.bindings_of(backend.backend_id, PRODUCT)? {
        if binding.get("no_stock_sync").is_some_and(values::is_truthy) {
            continue;
        }
        let Some(record_id) = binding.record_id() else {
            continue;
        };
        let Some(product) = ctx.session.browse(local::PRODUCT, record_id)? else {
            continue;
        };
        if values::get_str(&product.values, "type") == Some("service") {
            continue;
        }
        let qty = product.get(stock_field).and_then(Value::as_f64).unwrap_or(0.0);
        if binding.get("shopware_qty").and_then(Value::as_f64) != Some(qty) {
            ctx.session.write_binding(
                binding.id,
                values::object(json!({ "shopware_qty": qty })),
                WriteContext::default(),
            )?;
            changed += 1;
        }
    }
    Ok(changed)
}
