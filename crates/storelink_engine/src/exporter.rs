//! Record exporter.
//!
//! Pushes one binding to the remote system: creates the remote record when
//! the binding has no remote id yet, updates it otherwise, then binds the
//! remote id. A creation refused because the record already exists is
//! reconciled by the hooks when they can find the remote twin.

use crate::binder::BoundRecord;
use crate::config::BackendConfig;
use crate::environment::SyncContext;
use crate::error::{SyncError, SyncResult};
use std::sync::Arc;
use storelink_core::{BindingId, CoreError, ExternalId, LockService, Values};
use tracing::{debug, info, warn};

/// Result of an export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The remote record was created or updated.
    Exported {
        /// Remote id now bound.
        external_id: ExternalId,
        /// Whether the remote record was created.
        created: bool,
    },
    /// Nothing was sent.
    Skipped(String),
}

impl ExportOutcome {
    /// Message recorded as the job result.
    pub fn message(&self) -> Option<String> {
        match self {
            ExportOutcome::Skipped(reason) => Some(reason.clone()),
            ExportOutcome::Exported { .. } => None,
        }
    }
}

/// Model-specific behavior of an export.
pub trait ExportHooks: Send + Sync {
    /// Binding model exported.
    fn model(&self) -> &str;

    /// Returns a reason when the binding must not be exported.
    fn skip_reason(&self, _ctx: &mut SyncContext<'_>, _bound: &BoundRecord) -> SyncResult<Option<String>> {
        Ok(None)
    }

    /// Exports the records this one depends on.
    fn export_dependencies(&self, _ctx: &mut SyncContext<'_>, _bound: &BoundRecord) -> SyncResult<()> {
        Ok(())
    }

    /// Builds the payload. `fields` restricts an update to the fields that
    /// changed.
    fn payload(
        &self,
        ctx: &mut SyncContext<'_>,
        bound: &BoundRecord,
        fields: Option<&[String]>,
    ) -> SyncResult<Values>;

    /// Creates the remote record. `Ok(None)` when the remote side accepted
    /// the call without returning an id.
    fn create(
        &self,
        ctx: &mut SyncContext<'_>,
        _bound: &BoundRecord,
        payload: &Values,
    ) -> SyncResult<Option<ExternalId>> {
        ctx.env.adapter(self.model())?.create(payload).map(Some)
    }

    /// Updates the remote record.
    fn update(
        &self,
        ctx: &mut SyncContext<'_>,
        _bound: &BoundRecord,
        external_id: &ExternalId,
        payload: &Values,
    ) -> SyncResult<()> {
        ctx.env.adapter(self.model())?.write(external_id, payload)
    }

    /// Finds the remote twin of a binding when creation was refused or
    /// returned no id.
    fn reconcile(&self, _ctx: &mut SyncContext<'_>, _bound: &BoundRecord) -> SyncResult<Option<ExternalId>> {
        Ok(None)
    }

    /// Runs after the remote id was bound.
    fn after_export(
        &self,
        _ctx: &mut SyncContext<'_>,
        _bound: &BoundRecord,
        _external_id: &ExternalId,
    ) -> SyncResult<()> {
        Ok(())
    }
}

/// Name of the advisory lock taken while exporting a binding.
pub fn lock_name(backend: &BackendConfig, model: &str, binding_id: BindingId) -> String {
    format!(
        "export({}, {}, {}, {})",
        backend.backend_type,
        backend.backend_id,
        model,
        binding_id.as_u64()
    )
}

/// Runs exports for one binding model.
#[derive(Clone)]
pub struct Exporter {
    hooks: Arc<dyn ExportHooks>,
}

impl Exporter {
    /// Creates an exporter.
    pub fn new(hooks: Arc<dyn ExportHooks>) -> Self {
        Self { hooks }
    }

    /// Returns the binding model exported.
    pub fn model(&self) -> &str {
        self.hooks.model()
    }

    /// Exports one binding.
    pub fn run(
        &self,
        ctx: &mut SyncContext<'_>,
        binding_id: BindingId,
        fields: Option<&[String]>,
    ) -> SyncResult<ExportOutcome> {
        let hooks = &*self.hooks;
        let model = hooks.model();
        let binder = ctx.binder(model)?;
        let bound = binder.browse(&*ctx.session, binding_id)?;

        if let Some(reason) = hooks.skip_reason(ctx, &bound)? {
            debug!(%model, %binding_id, %reason, "export skipped");
            return Ok(ExportOutcome::Skipped(reason));
        }

        let lock = lock_name(ctx.env.backend(), model, binding_id);
        ctx.session.acquire_or_retry(&lock).map_err(|e| match e {
            CoreError::LockConflict { name } => SyncError::LockConflict(name),
            other => SyncError::Store(other),
        })?;

        hooks.export_dependencies(ctx, &bound)?;
        let payload = hooks.payload(ctx, &bound, fields)?;

        let (external_id, created) = match bound.external_id() {
            Some(external_id) => {
                hooks.update(ctx, &bound, external_id, &payload)?;
                (external_id.clone(), false)
            }
            None => {
                let created = match hooks.create(ctx, &bound, &payload) {
                    Ok(Some(id)) => Some(id),
                    Ok(None) => hooks.reconcile(ctx, &bound)?,
                    Err(SyncError::AlreadyExists(message)) => {
                        warn!(%model, %binding_id, %message, "remote record exists, reconciling");
                        match hooks.reconcile(ctx, &bound)? {
                            Some(id) => Some(id),
                            None => return Err(SyncError::AlreadyExists(message)),
                        }
                    }
                    Err(e) => return Err(e),
                };
                match created {
                    Some(id) => (id, true),
                    None => {
                        return Ok(ExportOutcome::Skipped(format!(
                            "no remote id returned for {binding_id}"
                        )))
                    }
                }
            }
        };

        binder.bind(ctx.session, &external_id, binding_id)?;
        hooks.after_export(ctx, &bound, &external_id)?;
        info!(%model, %binding_id, %external_id, created, "exported");
        Ok(ExportOutcome::Exported {
            external_id,
            created,
        })
    }
}
