//! Per-backend environment and the context handed to every sync unit.

use crate::adapter::Adapter;
use crate::batch::BatchImport;
use crate::binder::Binder;
use crate::config::BackendConfig;
use crate::deleter::Deleter;
use crate::error::SyncResult;
use crate::exporter::Exporter;
use crate::importer::Importer;
use crate::jobs::{JobRequest, JobScheduler};
use crate::mapper::{MapContext, MapOptions};
use crate::registry::ConnectorRegistry;
use std::sync::Arc;
use storelink_core::{BackendId, BindingModel, Session};
use tracing::trace;
use uuid::Uuid;

/// A backend together with the registry its units come from.
#[derive(Clone)]
pub struct Environment {
    backend: BackendConfig,
    registry: Arc<ConnectorRegistry>,
}

impl Environment {
    /// Creates an environment.
    pub fn new(backend: BackendConfig, registry: Arc<ConnectorRegistry>) -> Self {
        Self { backend, registry }
    }

    /// Returns the backend configuration.
    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    /// Returns the backend id.
    pub fn backend_id(&self) -> BackendId {
        self.backend.backend_id
    }

    /// Returns the registry.
    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Returns the binding model named `model`.
    pub fn binding_model(&self, model: &str) -> SyncResult<&BindingModel> {
        self.registry.binding_model(model)
    }

    /// Returns a binder for `model` on this backend.
    pub fn binder(&self, model: &str) -> SyncResult<Binder> {
        let binding_model = self.registry.binding_model(model)?;
        Ok(Binder::new(self.backend.backend_id, binding_model.clone()))
    }

    /// Returns the adapter for `model`.
    pub fn adapter(&self, model: &str) -> SyncResult<Arc<dyn Adapter>> {
        self.registry.adapter(&self.backend, model)
    }

    /// Returns the importer for `model`.
    pub fn importer(&self, model: &str) -> SyncResult<Importer> {
        Ok(Importer::new(self.registry.importer(&self.backend, model)?))
    }

    /// Returns the batch importer for `model`.
    pub fn batch_importer(&self, model: &str) -> SyncResult<Arc<dyn BatchImport>> {
        self.registry.batch_importer(&self.backend, model)
    }

    /// Returns the exporter for `model`.
    pub fn exporter(&self, model: &str) -> SyncResult<Exporter> {
        Ok(Exporter::new(self.registry.exporter(&self.backend, model)?))
    }

    /// Returns a deleter working on the adapter of `model`.
    pub fn deleter(&self, model: &str) -> SyncResult<Deleter> {
        Ok(Deleter::new(self.adapter(model)?))
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("backend", &self.backend)
            .field("units", &self.registry.unit_count())
            .finish()
    }
}

/// Everything a unit needs while it runs: the backend environment, the
/// transaction of the current job and the job scheduler.
pub struct SyncContext<'a> {
    /// Backend environment.
    pub env: &'a Environment,
    /// Session of the current job.
    pub session: &'a mut dyn Session,
    /// Scheduler for follow-up jobs.
    pub jobs: &'a dyn JobScheduler,
}

impl<'a> SyncContext<'a> {
    /// Creates a context.
    pub fn new(env: &'a Environment, session: &'a mut dyn Session, jobs: &'a dyn JobScheduler) -> Self {
        Self { env, session, jobs }
    }

    /// Returns the backend id.
    pub fn backend_id(&self) -> BackendId {
        self.env.backend_id()
    }

    /// Returns a binder for `model`.
    pub fn binder(&self, model: &str) -> SyncResult<Binder> {
        self.env.binder(model)
    }

    /// Builds a mapping context reading from the current session.
    pub fn map_context(&self, options: MapOptions) -> MapContext<'_> {
        MapContext::new(self.env, &*self.session, options)
    }

    /// Schedules a follow-up job.
    pub fn schedule(&self, request: JobRequest) -> Uuid {
        self.jobs.schedule(request)
    }

    /// Delivers the writes made so far to the registered listeners.
    ///
    /// Listeners may write in turn; their writes are delivered in the next
    /// round until no event is left. Returns the number of events seen.
    pub fn dispatch_write_events(&mut self) -> SyncResult<usize> {
        let env = self.env;
        let mut seen = 0;
        loop {
            let events = self.session.take_write_events();
            if events.is_empty() {
                return Ok(seen);
            }
            seen += events.len();
            for event in &events {
                for listener in env.registry().listeners(env.backend(), &event.model) {
                    trace!(model = %event.model, target = ?event.target, "dispatching write");
                    listener.on_write(self, event)?;
                }
            }
        }
    }
}
