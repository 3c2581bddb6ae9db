//! # storelink shopware
//!
//! Shopware backend for the storelink synchronization engine.
//!
//! This crate provides:
//! - The binding models of a Shopware backend
//! - Importers for shops, customer groups, customers and their address
//!   book, the category tree, articles and their variants
//! - Exporters for inventory, invoices and tracking numbers, with the
//!   write listeners scheduling them
//! - Backend operations run as jobs (metadata, "import since" runs, stock
//!   quantities)
//!
//! ## Architecture
//!
//! [`registry`] assembles every unit under the `shopware` backend type. The
//! adapters come from an [`AdapterSource`]: REST adapters over an HTTP
//! client for a live shop, or adapters replaying recorded responses.
//! [`backend::functions`] lists the job functions a runner needs.
//!
//! ## Key Invariants
//!
//! - Customers are imported after their group, variants after their article
//! - The default billing address of a customer is merged into the customer
//!   unless it belongs to a company
//! - Inventory and tracking exports run after the exports scheduled with the
//!   default priority

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapters;
pub mod backend;
pub mod invoice;
pub mod models;
pub mod partner;
pub mod partner_category;
pub mod product;
pub mod product_category;
pub mod shop;
pub mod tracking;

pub use adapters::{AdapterSource, RestSource};
pub use models::BACKEND_TYPE;

use std::sync::Arc;
use storelink_engine::{BackendConfig, BackendKey, ConnectorRegistry, Environment, ModelBatchImporter};

/// Builds the registry of a Shopware backend.
pub fn registry(source: &dyn AdapterSource) -> ConnectorRegistry {
    let key = BackendKey::new(BACKEND_TYPE);
    let mut registry = ConnectorRegistry::new();

    for model in models::binding_models() {
        registry.register_binding_model(model);
    }
    for (model, resource) in adapters::RESOURCES {
        registry.register_adapter(&key, model, source.adapter(resource));
    }

    registry
        .register_importer(&key, Arc::new(shop::ShopImporter::new()))
        .register_importer(&key, Arc::new(partner_category::PartnerCategoryImporter::new()))
        .register_importer(&key, Arc::new(product_category::ProductCategoryImporter::new()))
        .register_importer(&key, Arc::new(product::ArticleImporter::new()))
        .register_importer(&key, Arc::new(product::ProductImporter::new()));
    for importer in partner::importers() {
        registry.register_importer(&key, importer);
    }

    registry
        .register_batch_importer(&key, Arc::new(ModelBatchImporter::direct(models::SHOP)))
        .register_batch_importer(&key, Arc::new(ModelBatchImporter::deferred(models::PARTNER_CATEGORY)))
        .register_batch_importer(&key, Arc::new(ModelBatchImporter::deferred(models::PARTNER)))
        .register_batch_importer(&key, Arc::new(ModelBatchImporter::deferred(models::ARTICLE)))
        .register_batch_importer(&key, Arc::new(ModelBatchImporter::deferred(models::PRODUCT)))
        .register_batch_importer(&key, Arc::new(product_category::CategoryTreeBatch));

    registry
        .register_exporter(&key, Arc::new(product::InventoryExporter))
        .register_exporter(&key, Arc::new(invoice::InvoiceExporter))
        .register_exporter(&key, Arc::new(tracking::TrackingExporter));

    registry
        .register_listener(&key, models::PRODUCT, Arc::new(product::InventoryListener))
        .register_listener(&key, models::local::INVOICE, Arc::new(invoice::InvoiceListener))
        .register_listener(&key, models::local::PICKING, Arc::new(tracking::TrackingListener));

    registry
}

/// Builds the environment of a Shopware backend.
pub fn environment(backend: BackendConfig, source: &dyn AdapterSource) -> Environment {
    Environment::new(backend, Arc::new(registry(source)))
}

/// Version of the storelink shopware crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
