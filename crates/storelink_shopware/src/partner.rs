//! Customers and their address book.
//!
//! Shopware accounts and local partners do not share a data model. An
//! account whose default billing address names a company is imported as a
//! company: the billing address is copied onto the partner and every
//! address becomes a child contact. For individuals the default billing
//! address is merged into the partner itself.

use crate::models::{local, ADDRESS, PARTNER, PARTNER_CATEGORY, SHOP};
use serde_json::{json, Value};
use std::sync::Arc;
use storelink_core::{
    values, Binding, BindingId, BindingStore, CoreError, ExternalId, RecordStore, Values,
};
use storelink_engine::mapper::convert;
use storelink_engine::{
    ImportHooks, ImportMapper, MapContext, RunOptions, SearchFilter, SyncContext, SyncError,
    SyncResult,
};
use tracing::debug;

/// Mapping option naming the partner binding an address belongs to.
pub const PARTNER_BINDING_OPTION: &str = "partner_binding_id";
/// Mapping option telling whether an address is merged into its partner.
pub const MERGE_OPTION: &str = "merge";

fn full_name(record: &Values) -> Values {
    let parts: Vec<&str> = ["firstname", "middlename", "lastname"]
        .iter()
        .filter_map(|key| values::get_str(record, key))
        .filter(|part| !part.is_empty())
        .collect();
    values::object(json!({ "name": parts.join(" ") }))
}

/// Splits a multi-line street into `street` and `street2`.
pub fn split_street(street: &str) -> Values {
    let lines: Vec<&str> = street
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    match lines.as_slice() {
        [] => Values::new(),
        [single] => values::object(json!({ "street": single, "street2": false })),
        [first, rest @ ..] => values::object(json!({ "street": first, "street2": rest.join(" - ") })),
    }
}

fn country(ctx: &MapContext<'_>, record: &Values) -> SyncResult<Values> {
    let Some(code) = values::get_set(record, "country_id") else {
        return Ok(Values::new());
    };
    let found = ctx.session.search(local::COUNTRY, "code", code)?;
    Ok(match found.first() {
        Some(id) => values::object(json!({ "country_id": id.as_u64() })),
        None => Values::new(),
    })
}

/// Postal fields shared by addresses and companies.
fn with_address_fields(mapper: ImportMapper) -> ImportMapper {
    mapper
        .direct("postcode", "zip")
        .direct("city", "city")
        .direct("telephone", "phone")
        .direct("fax", "fax")
        .direct("company", "company")
        .rule("street", |_, record| {
            Ok(values::get_str(record, "street").map_or_else(Values::new, split_street))
        })
        .rule("country", country)
}

/// Imports customers.
///
/// The customer group is a dependency. New customers are bound to an
/// existing partner with the same e-mail when there is one. After each
/// import, the address book of the customer is imported.
pub struct PartnerImporter {
    mapper: ImportMapper,
}

impl PartnerImporter {
    /// Creates the importer.
    pub fn new() -> Self {
        let mapper = ImportMapper::new(PARTNER)
            .direct("email", "email")
            .direct("birthday", "birthday")
            .direct("group_id", "shopware_group_id")
            .direct_with("firstLogin", "created_at", convert::datetime)
            .direct_with("changed", "updated_at", convert::datetime)
            .rule("names", |_, record| Ok(full_name(record)))
            // the shop language, when set, wins over the backend default
            .rule_on_create("lang", |ctx, _| {
                Ok(match &ctx.backend().default_lang {
                    Some(lang) => values::object(json!({ "lang": lang })),
                    None => Values::new(),
                })
            })
            .rule("customer_group", |ctx, record| {
                let group = record.get("group_id");
                match ctx.require_record(PARTNER_CATEGORY, group) {
                    Ok(Some(id)) => Ok(values::object(json!({ "category_ids": [id.as_u64()] }))),
                    Ok(None) => Ok(Values::new()),
                    Err(SyncError::Mapping(_)) => Err(SyncError::mapping(format!(
                        "The partner category with shopware id {} does not exist",
                        group.and_then(ExternalId::from_value).map(|id| id.to_string()).unwrap_or_default()
                    ))),
                    Err(e) => Err(e),
                }
            })
            .rule("shop", |ctx, record| {
                let Some(shop) = record.get("shop_id").and_then(ExternalId::from_value) else {
                    return Ok(Values::new());
                };
                let binder = ctx.binder(SHOP)?;
                let Some(binding) = binder.binding_for(ctx.session, &shop)? else {
                    return Ok(Values::new());
                };
                let mut out = values::object(json!({ "shop_id": binding.id.as_u64() }));
                if let Some(lang) = binding.get("lang").filter(|l| values::is_truthy(l)) {
                    out.insert("lang".into(), lang.clone());
                }
                Ok(out)
            })
            .rule("type", |_, _| Ok(values::object(json!({ "type": "default" }))))
            .rule_on_create("is_company", |_, _| Ok(values::object(json!({ "is_company": true }))))
            .rule_on_create("customer", |_, _| Ok(values::object(json!({ "customer": true }))))
            .rule_on_create("record_id", |ctx, record| {
                let Some(email) = values::get_set(record, "email") else {
                    return Ok(Values::new());
                };
                for id in ctx.session.search(local::PARTNER, "email", email)? {
                    let Some(partner) = ctx.session.browse(local::PARTNER, id)? else {
                        continue;
                    };
                    let flag = |field: &str| partner.get(field).is_some_and(values::is_truthy);
                    if flag("customer") && (flag("is_company") || !flag("parent_id")) {
                        return Ok(values::object(json!({ "record_id": id.as_u64() })));
                    }
                }
                Ok(Values::new())
            });
        Self { mapper }
    }
}

impl Default for PartnerImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportHooks for PartnerImporter {
    fn model(&self) -> &str {
        PARTNER
    }

    fn mapper(&self) -> &ImportMapper {
        &self.mapper
    }

    fn import_dependencies(&self, ctx: &mut SyncContext<'_>, record: &Values) -> SyncResult<()> {
        ctx.import_dependency_value(record.get("group_id"), PARTNER_CATEGORY, false)
    }

    fn after_import(&self, ctx: &mut SyncContext<'_>, binding: &Binding, _record: &Values) -> SyncResult<()> {
        let Some(external_id) = binding.external_id.clone() else {
            return Ok(());
        };
        AddressBook::new().import_addresses(ctx, &external_id, binding.id)?;
        Ok(())
    }
}

/// Values copied from a company billing address onto its partner.
pub struct CompanyMapper {
    mapper: ImportMapper,
}

impl CompanyMapper {
    /// Creates the mapper.
    pub fn new() -> Self {
        let mapper = with_address_fields(ImportMapper::new(PARTNER))
            .direct("company", "name")
            .rule("consider_as_company", |_, _| {
                Ok(values::object(json!({ "consider_as_company": true })))
            });
        Self { mapper }
    }

    /// Returns the mapper.
    pub fn mapper(&self) -> &ImportMapper {
        &self.mapper
    }
}

impl Default for CompanyMapper {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides how each address of a customer is imported and hands it to the
/// address importer.
#[derive(Debug, Default)]
pub struct AddressBook;

impl AddressBook {
    /// Creates the address book.
    pub fn new() -> Self {
        Self
    }

    /// Imports every address of the customer `partner`. Returns the number
    /// of addresses found.
    pub fn import_addresses(
        &self,
        ctx: &mut SyncContext<'_>,
        partner: &ExternalId,
        partner_binding: BindingId,
    ) -> SyncResult<usize> {
        let adapter = ctx.env.adapter(ADDRESS)?;
        let ids = adapter.search(&SearchFilter::new().with_condition("customer_id", partner.to_value()))?;
        let importer = ctx.env.importer(ADDRESS)?;
        for address_id in &ids {
            let record = adapter.read(address_id)?;
            let merge = self.relationship(ctx, &record, partner_binding)?;
            debug!(%partner, %address_id, merge, "importing address");
            let options = RunOptions::default()
                .with_preloaded(record)
                .with_option(PARTNER_BINDING_OPTION, partner_binding.as_u64())
                .with_option(MERGE_OPTION, merge);
            importer.run(ctx, address_id, options)?;
        }
        Ok(ids.len())
    }

    /// Returns true when the address is merged into the partner.
    ///
    /// Only the default billing address is ever merged, and only for
    /// individuals. For a company it is copied onto the partner instead.
    fn relationship(
        &self,
        ctx: &mut SyncContext<'_>,
        record: &Values,
        partner_binding: BindingId,
    ) -> SyncResult<bool> {
        if !record.get("is_default_billing").is_some_and(values::is_truthy) {
            return Ok(false);
        }
        let binder = ctx.binder(PARTNER)?;
        let binding = ctx
            .session
            .binding(partner_binding)?
            .ok_or(CoreError::BindingNotFound {
                id: partner_binding.as_u64(),
            })?;
        if values::get_set(record, "company").is_some() {
            let company = {
                let map_ctx = ctx.map_context(Values::new());
                CompanyMapper::new().mapper().map_record(record).values(&map_ctx, false)?
            };
            binder.update_binding(ctx.session, &binding, company)?;
            Ok(false)
        } else {
            binder.update_binding(
                ctx.session,
                &binding,
                values::object(json!({ "consider_as_company": false })),
            )?;
            Ok(true)
        }
    }
}

/// Imports customer addresses.
///
/// New addresses need the partner they belong to, handed over as mapping
/// options by the [`AddressBook`].
pub struct AddressImporter {
    mapper: ImportMapper,
}

impl AddressImporter {
    /// Creates the importer.
    pub fn new() -> Self {
        let mapper = with_address_fields(ImportMapper::new(ADDRESS))
            .direct_with("changed", "updated_at", convert::datetime)
            .direct_with("is_default_billing", "is_default_billing", convert::boolean)
            .direct_with("is_default_shipping", "is_default_shipping", convert::boolean)
            .rule("names", |_, record| Ok(full_name(record)))
            .rule("use_parent_address", |_, _| {
                Ok(values::object(json!({ "use_parent_address": false })))
            })
            .rule("type", |_, record| {
                let flag = |field: &str| record.get(field).is_some_and(values::is_truthy);
                let kind = if flag("is_default_billing") {
                    "invoice"
                } else if flag("is_default_shipping") {
                    "delivery"
                } else {
                    "contact"
                };
                Ok(values::object(json!({ "type": kind })))
            });
        Self { mapper }
    }
}

impl Default for AddressImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportHooks for AddressImporter {
    fn model(&self) -> &str {
        ADDRESS
    }

    fn mapper(&self) -> &ImportMapper {
        &self.mapper
    }

    fn before_create(
        &self,
        ctx: &mut SyncContext<'_>,
        _record: &Values,
        values: &mut Values,
        options: &RunOptions,
    ) -> SyncResult<()> {
        let partner_binding = options
            .map_options
            .get(PARTNER_BINDING_OPTION)
            .and_then(Value::as_u64)
            .map(BindingId::new)
            .ok_or_else(|| {
                SyncError::invalid_data("the partner of a new address is required to create it")
            })?;
        let merge = options
            .map_options
            .get(MERGE_OPTION)
            .is_some_and(values::is_truthy);
        let partner = ctx.binder(PARTNER)?.browse(&*ctx.session, partner_binding)?;
        let partner_id = partner.record_id().ok_or_else(|| {
            SyncError::invalid_data(format!("partner binding {partner_binding} has no partner"))
        })?;

        if merge {
            values.insert("record_id".into(), json!(partner_id.as_u64()));
            values.insert("type".into(), json!("default"));
        } else {
            values.insert("parent_id".into(), json!(partner_id.as_u64()));
            values.insert("lang".into(), partner.get("lang").cloned().unwrap_or(Value::Null));
        }
        values.insert("shopware_partner_id".into(), json!(partner_binding.as_u64()));
        Ok(())
    }
}

/// The importers of this module, ready to register.
pub fn importers() -> Vec<Arc<dyn ImportHooks>> {
    vec![Arc::new(PartnerImporter::new()), Arc::new(AddressImporter::new())]
}
