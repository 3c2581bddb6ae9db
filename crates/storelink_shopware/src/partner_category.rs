//! Customer groups, imported as partner categories.

use crate::models::{local, PARTNER_CATEGORY};
use serde_json::json;
use storelink_core::{values, RecordStore, Values};
use storelink_engine::{ImportHooks, ImportMapper};

/// Imports customer groups.
pub struct PartnerCategoryImporter {
    mapper: ImportMapper,
}

impl PartnerCategoryImporter {
    /// Creates the importer.
    pub fn new() -> Self {
        let mapper = ImportMapper::new(PARTNER_CATEGORY)
            .direct("key", "name")
            // binds the group on an existing category of the same name
            .rule_on_create("record_id", |ctx, record| {
                let Some(key) = record.get("key") else {
                    return Ok(Values::new());
                };
                let existing = ctx.session.search(local::PARTNER_CATEGORY, "name", key)?;
                Ok(match existing.first() {
                    Some(id) => values::object(json!({ "record_id": id.as_u64() })),
                    None => Values::new(),
                })
            });
        Self { mapper }
    }
}

impl Default for PartnerCategoryImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportHooks for PartnerCategoryImporter {
    fn model(&self) -> &str {
        PARTNER_CATEGORY
    }

    fn mapper(&self) -> &ImportMapper {
        &self.mapper
    }
}
