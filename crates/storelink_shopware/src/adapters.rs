//! Remote resources of the Shopware API and where their adapters come from.

use crate::models;
use std::sync::Arc;
use storelink_engine::{Adapter, BackendConfig, HttpClient, Recorder, RecordingAdapter, RestAdapter};

/// Remote resource of each binding model.
pub const RESOURCES: [(&str, &str); 9] = [
    (models::SHOP, "shops"),
    (models::PARTNER_CATEGORY, "customerGroups"),
    (models::PARTNER, "customers"),
    (models::ADDRESS, "addresses"),
    (models::PRODUCT_CATEGORY, "categories"),
    (models::ARTICLE, "articles"),
    (models::PRODUCT, "variants"),
    (models::INVOICE, "invoices"),
    (models::PICKING, "shipments"),
];

/// Returns the remote resource of a binding model.
pub fn resource(model: &str) -> Option<&'static str> {
    RESOURCES
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, resource)| *resource)
}

/// Builds the adapter of a remote resource.
pub trait AdapterSource {
    /// Returns an adapter for `resource`.
    fn adapter(&self, resource: &str) -> Arc<dyn Adapter>;
}

impl AdapterSource for Arc<Recorder> {
    fn adapter(&self, resource: &str) -> Arc<dyn Adapter> {
        Arc::new(RecordingAdapter::new(resource, Arc::clone(self)))
    }
}

/// Adapters talking to a live shop over HTTP.
pub struct RestSource<C> {
    api_url: String,
    credentials: (String, String),
    client: Arc<C>,
}

impl<C: HttpClient + 'static> RestSource<C> {
    /// Uses the location and credentials of `backend`.
    pub fn new(backend: &BackendConfig, client: Arc<C>) -> Self {
        Self {
            api_url: backend.api_url(),
            credentials: (backend.username.clone(), backend.token.clone()),
            client,
        }
    }
}

impl<C: HttpClient + 'static> AdapterSource for RestSource<C> {
    fn adapter(&self, resource: &str) -> Arc<dyn Adapter> {
        let (username, token) = &self.credentials;
        Arc::new(
            RestAdapter::new(self.api_url.clone(), resource, Arc::clone(&self.client))
                .with_credentials(username.clone(), token.clone()),
        )
    }
}
