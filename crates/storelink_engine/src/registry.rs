//! Unit registry.
//!
//! Every synchronization unit (adapter, importer, batch importer, exporter,
//! write listener) is registered for a backend type, optionally pinned to a
//! version, and a binding model. Lookups prefer the unit registered for the
//! exact version and fall back to the version-less one.

use crate::adapter::Adapter;
use crate::batch::BatchImport;
use crate::config::BackendConfig;
use crate::error::{SyncError, SyncResult};
use crate::exporter::ExportHooks;
use crate::importer::ImportHooks;
use crate::listener::WriteListener;
use std::collections::HashMap;
use std::sync::Arc;
use storelink_core::BindingModel;

/// Backend type and optional version a unit is registered for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendKey {
    /// Backend type (e.g. `shopware`).
    pub backend_type: String,
    /// Version, or `None` for every version of the type.
    pub version: Option<String>,
}

impl BackendKey {
    /// Key matching every version of a backend type.
    pub fn new(backend_type: impl Into<String>) -> Self {
        Self {
            backend_type: backend_type.into(),
            version: None,
        }
    }

    /// Pins the key to one version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

type UnitKey = (String, Option<String>, String);

struct UnitTable<T: ?Sized> {
    capability: &'static str,
    units: HashMap<UnitKey, Arc<T>>,
}

impl<T: ?Sized> UnitTable<T> {
    fn new(capability: &'static str) -> Self {
        Self {
            capability,
            units: HashMap::new(),
        }
    }

    fn insert(&mut self, backend: &BackendKey, model: &str, unit: Arc<T>) {
        self.units.insert(
            (
                backend.backend_type.clone(),
                backend.version.clone(),
                model.to_string(),
            ),
            unit,
        );
    }

    fn lookup(&self, backend: &BackendConfig, model: &str) -> SyncResult<Arc<T>> {
        let exact = (
            backend.backend_type.clone(),
            Some(backend.version.clone()),
            model.to_string(),
        );
        let any = (backend.backend_type.clone(), None, model.to_string());
        self.units
            .get(&exact)
            .or_else(|| self.units.get(&any))
            .cloned()
            .ok_or_else(|| no_unit(backend, self.capability, model))
    }

    fn len(&self) -> usize {
        self.units.len()
    }
}

fn no_unit(backend: &BackendConfig, capability: &str, model: &str) -> SyncError {
    SyncError::NoUnit {
        backend: format!("{} {}", backend.backend_type, backend.version),
        capability: capability.to_string(),
        model: model.to_string(),
    }
}

/// Registry of synchronization units and binding models.
pub struct ConnectorRegistry {
    binding_models: HashMap<String, BindingModel>,
    adapters: UnitTable<dyn Adapter>,
    importers: UnitTable<dyn ImportHooks>,
    batch_importers: UnitTable<dyn BatchImport>,
    exporters: UnitTable<dyn ExportHooks>,
    listeners: Vec<(BackendKey, String, Arc<dyn WriteListener>)>,
}

impl ConnectorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            binding_models: HashMap::new(),
            adapters: UnitTable::new("adapter"),
            importers: UnitTable::new("importer"),
            batch_importers: UnitTable::new("batch importer"),
            exporters: UnitTable::new("exporter"),
            listeners: Vec::new(),
        }
    }

    /// Declares a binding model.
    pub fn register_binding_model(&mut self, model: BindingModel) -> &mut Self {
        self.binding_models.insert(model.name.clone(), model);
        self
    }

    /// Registers the adapter used for `model`.
    pub fn register_adapter(
        &mut self,
        backend: &BackendKey,
        model: &str,
        adapter: Arc<dyn Adapter>,
    ) -> &mut Self {
        self.adapters.insert(backend, model, adapter);
        self
    }

    /// Registers an importer under the model its hooks name.
    pub fn register_importer(&mut self, backend: &BackendKey, hooks: Arc<dyn ImportHooks>) -> &mut Self {
        let model = hooks.model().to_string();
        self.importers.insert(backend, &model, hooks);
        self
    }

    /// Registers a batch importer under the model it names.
    pub fn register_batch_importer(
        &mut self,
        backend: &BackendKey,
        batch: Arc<dyn BatchImport>,
    ) -> &mut Self {
        let model = batch.model().to_string();
        self.batch_importers.insert(backend, &model, batch);
        self
    }

    /// Registers an exporter under the model its hooks name.
    pub fn register_exporter(&mut self, backend: &BackendKey, hooks: Arc<dyn ExportHooks>) -> &mut Self {
        let model = hooks.model().to_string();
        self.exporters.insert(backend, &model, hooks);
        self
    }

    /// Registers a listener for writes on `model`.
    ///
    /// Several listeners may watch the same model; they run in registration
    /// order.
    pub fn register_listener(
        &mut self,
        backend: &BackendKey,
        model: &str,
        listener: Arc<dyn WriteListener>,
    ) -> &mut Self {
        self.listeners
            .push((backend.clone(), model.to_string(), listener));
        self
    }

    /// Returns a binding model by name.
    pub fn binding_model(&self, name: &str) -> SyncResult<&BindingModel> {
        self.binding_models.get(name).ok_or_else(|| SyncError::NoUnit {
            backend: "any".to_string(),
            capability: "binding model".to_string(),
            model: name.to_string(),
        })
    }

    /// Returns the adapter for `model`.
    pub fn adapter(&self, backend: &BackendConfig, model: &str) -> SyncResult<Arc<dyn Adapter>> {
        self.adapters.lookup(backend, model)
    }

    /// Returns the importer hooks for `model`.
    pub fn importer(&self, backend: &BackendConfig, model: &str) -> SyncResult<Arc<dyn ImportHooks>> {
        self.importers.lookup(backend, model)
    }

    /// Returns the batch importer for `model`.
    pub fn batch_importer(
        &self,
        backend: &BackendConfig,
        model: &str,
    ) -> SyncResult<Arc<dyn BatchImport>> {
        self.batch_importers.lookup(backend, model)
    }

    /// Returns the exporter hooks for `model`.
    pub fn exporter(&self, backend: &BackendConfig, model: &str) -> SyncResult<Arc<dyn ExportHooks>> {
        self.exporters.lookup(backend, model)
    }

    /// Returns the listeners watching `model` on `backend`.
    pub fn listeners(&self, backend: &BackendConfig, model: &str) -> Vec<Arc<dyn WriteListener>> {
        self.listeners
            .iter()
            .filter(|(key, watched, _)| {
                watched == model
                    && key.backend_type == backend.backend_type
                    && key.version.as_ref().map_or(true, |v| *v == backend.version)
            })
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect()
    }

    /// Returns the number of registered units, binding models excluded.
    pub fn unit_count(&self) -> usize {
        self.adapters.len()
            + self.importers.len()
            + self.batch_importers.len()
            + self.exporters.len()
            + self.listeners.len()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
