//! Record importer.
//!
//! Imports one remote record into the local store. A run goes through a
//! fixed sequence of steps, each of which model-specific hooks may refine:
//!
//! 1. fetch the remote record (or take the preloaded one)
//! 2. ask the hooks whether the record must be skipped
//! 3. skip when the binding is at least as fresh as the remote record
//! 4. take the advisory lock for (backend, model, remote id), then read
//!    the binding again and repeat the freshness check
//! 5. run `before_import`
//! 6. import dependencies
//! 7. map the record, with create-only rules for new records
//! 8. validate
//! 9. create or update the binding and its record
//! 10. bind the remote id, stamping the sync date
//! 11. run `after_create` (new records) and `after_import`
//!
//! A remote record that vanished is not an error: the run ends with
//! [`SkipReason::NoLongerExists`].

use crate::config::BackendConfig;
use crate::environment::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::mapper::{ImportMapper, MapOptions};
use std::fmt;
use std::sync::Arc;
use storelink_core::{
    timestamp, Binding, BindingId, BindingStore, CoreError, ExternalId, LockService, Values,
};
use tracing::{debug, info};

/// Why an import ended without writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The remote record no longer exists.
    NoLongerExists,
    /// The binding is at least as recent as the remote record.
    UpToDate,
    /// The hooks refused the record.
    MustSkip(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoLongerExists => f.write_str("Record does no longer exist"),
            SkipReason::UpToDate => f.write_str("Already up-to-date."),
            SkipReason::MustSkip(reason) => f.write_str(reason),
        }
    }
}

/// Result of an import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The record was written.
    Imported {
        /// Binding created or updated.
        binding_id: BindingId,
        /// Whether the binding was created by this run.
        created: bool,
    },
    /// Nothing was written.
    Skipped(SkipReason),
}

impl ImportOutcome {
    /// Returns the binding id if the record was written.
    pub fn binding_id(&self) -> Option<BindingId> {
        match self {
            ImportOutcome::Imported { binding_id, .. } => Some(*binding_id),
            ImportOutcome::Skipped(_) => None,
        }
    }

    /// Returns the skip reason if nothing was written.
    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            ImportOutcome::Skipped(reason) => Some(reason),
            ImportOutcome::Imported { .. } => None,
        }
    }

    /// Message recorded as the job result.
    pub fn message(&self) -> Option<String> {
        self.skip_reason().map(ToString::to_string)
    }
}

/// Options of one import run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Import even when the binding is up to date.
    pub force: bool,
    /// Remote record already read by the caller.
    pub preloaded: Option<Values>,
    /// Options handed to the mapper and the create hook.
    pub map_options: MapOptions,
}

impl RunOptions {
    /// Options forcing the import.
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    /// Uses an already read remote record.
    pub fn with_preloaded(mut self, record: Values) -> Self {
        self.preloaded = Some(record);
        self
    }

    /// Sets a mapping option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.map_options.insert(key.into(), value.into());
        self
    }
}

/// Model-specific behavior of an import.
///
/// Only [`ImportHooks::model`] and [`ImportHooks::mapper`] are required;
/// every other step defaults to the generic behavior.
pub trait ImportHooks: Send + Sync {
    /// Binding model imported.
    fn model(&self) -> &str;

    /// Mapper producing local values.
    fn mapper(&self) -> &ImportMapper;

    /// Reads the remote record.
    fn fetch(&self, ctx: &mut SyncContext<'_>, external_id: &ExternalId) -> SyncResult<Values> {
        ctx.env.adapter(self.model())?.read(external_id)
    }

    /// Returns a reason when the record must not be imported.
    fn must_skip(&self, _ctx: &mut SyncContext<'_>, _record: &Values) -> SyncResult<Option<String>> {
        Ok(None)
    }

    /// Remote field holding the last modification date, if the resource
    /// has one.
    fn changed_field(&self) -> Option<&str> {
        Some("changed")
    }

    /// Runs before anything is imported.
    fn before_import(&self, _ctx: &mut SyncContext<'_>, _record: &Values) -> SyncResult<()> {
        Ok(())
    }

    /// Imports the records this one depends on.
    fn import_dependencies(&self, _ctx: &mut SyncContext<'_>, _record: &Values) -> SyncResult<()> {
        Ok(())
    }

    /// Checks the mapped values before they are written.
    fn validate(&self, _values: &Values, _for_create: bool) -> SyncResult<()> {
        Ok(())
    }

    /// Adjusts the values of a record about to be created.
    fn before_create(
        &self,
        _ctx: &mut SyncContext<'_>,
        _record: &Values,
        _values: &mut Values,
        _options: &RunOptions,
    ) -> SyncResult<()> {
        Ok(())
    }

    /// Runs after a binding was created and bound.
    fn after_create(&self, _ctx: &mut SyncContext<'_>, _binding: &Binding) -> SyncResult<()> {
        Ok(())
    }

    /// Runs after every successful import.
    fn after_import(&self, _ctx: &mut SyncContext<'_>, _binding: &Binding, _record: &Values) -> SyncResult<()> {
        Ok(())
    }
}

/// Name of the advisory lock taken while importing a record.
pub fn lock_name(backend: &BackendConfig, model: &str, external_id: &ExternalId) -> String {
    format!(
        "import({}, {}, {}, {})",
        backend.backend_type, backend.backend_id, model, external_id
    )
}

/// Returns true when the binding is at least as recent as the remote
/// record.
///
/// Records without a modification date, without a binding or whose binding
/// was never synced are never up to date.
pub fn is_up_to_date(changed_field: Option<&str>, record: &Values, binding: Option<&Binding>) -> bool {
    let Some(field) = changed_field else {
        return false;
    };
    let Some(changed) = record.get(field).and_then(timestamp::from_value) else {
        return false;
    };
    let Some(sync_date) = binding.and_then(|b| b.sync_date) else {
        return false;
    };
    sync_date >= changed
}

/// Runs imports for one binding model.
#[derive(Clone)]
pub struct Importer {
    hooks: Arc<dyn ImportHooks>,
}

impl Importer {
    /// Creates an importer.
    pub fn new(hooks: Arc<dyn ImportHooks>) -> Self {
        Self { hooks }
    }

    /// Returns the binding model imported.
    pub fn model(&self) -> &str {
        self.hooks.model()
    }

    /// Imports one remote record.
    pub fn run(
        &self,
        ctx: &mut SyncContext<'_>,
        external_id: &ExternalId,
        options: RunOptions,
    ) -> SyncResult<ImportOutcome> {
        let hooks = &*self.hooks;
        let model = hooks.model();

        let record = match &options.preloaded {
            Some(record) => record.clone(),
            None => match hooks.fetch(ctx, external_id) {
                Ok(record) => record,
                Err(SyncError::NotFoundRemotely { .. }) => {
                    info!(%model, %external_id, "remote record vanished");
                    return Ok(ImportOutcome::Skipped(SkipReason::NoLongerExists));
                }
                Err(e) => return Err(e),
            },
        };

        if let Some(reason) = hooks.must_skip(ctx, &record)? {
            debug!(%model, %external_id, %reason, "skipped by hooks");
            return Ok(ImportOutcome::Skipped(SkipReason::MustSkip(reason)));
        }

        let binder = ctx.binder(model)?;
        let binding = binder.binding_for(&*ctx.session, external_id)?;
        if !options.force && is_up_to_date(hooks.changed_field(), &record, binding.as_ref()) {
            debug!(%model, %external_id, "already up to date");
            return Ok(ImportOutcome::Skipped(SkipReason::UpToDate));
        }

        let lock = lock_name(ctx.env.backend(), model, external_id);
        ctx.session.acquire_or_retry(&lock).map_err(|e| match e {
            CoreError::LockConflict { name } => SyncError::LockConflict(name),
            other => SyncError::Store(other),
        })?;

        // another job may have bound the record while we waited for the lock
        let binding = binder.binding_for(&*ctx.session, external_id)?;
        if !options.force && is_up_to_date(hooks.changed_field(), &record, binding.as_ref()) {
            debug!(%model, %external_id, "imported meanwhile");
            return Ok(ImportOutcome::Skipped(SkipReason::UpToDate));
        }

        hooks.before_import(ctx, &record)?;
        hooks.import_dependencies(ctx, &record)?;

        let for_create = binding.is_none();
        let mut values = {
            let map_ctx = ctx.map_context(options.map_options.clone());
            hooks.mapper().map_record(&record).values(&map_ctx, for_create)?
        };

        let binding_id = match &binding {
            Some(existing) => {
                hooks.validate(&values, false)?;
                binder.update_binding(ctx.session, existing, values)?;
                debug!(%model, %external_id, binding_id = %existing.id, "updated");
                existing.id
            }
            None => {
                hooks.before_create(ctx, &record, &mut values, &options)?;
                hooks.validate(&values, true)?;
                let id = binder.create_binding(ctx.session, values)?;
                debug!(%model, %external_id, binding_id = %id, "created");
                id
            }
        };

        binder.bind(ctx.session, external_id, binding_id)?;
        let bound = ctx
            .session
            .binding(binding_id)?
            .ok_or(CoreError::BindingNotFound {
                id: binding_id.as_u64(),
            })?;
        if for_create {
            hooks.after_create(ctx, &bound)?;
        }
        hooks.after_import(ctx, &bound, &record)?;

        info!(%model, %external_id, %binding_id, created = for_create, "imported");
        Ok(ImportOutcome::Imported {
            binding_id,
            created: for_create,
        })
    }
}

impl SyncContext<'_> {
    /// Imports a record this one depends on.
    ///
    /// Unless `always` is set, nothing happens when the dependency is
    /// already bound. The dependency is imported in the current
    /// transaction.
    pub fn import_dependency(&mut self, external_id: &ExternalId, model: &str, always: bool) -> SyncResult<()> {
        let binder = self.binder(model)?;
        if !always && binder.to_internal(&*self.session, external_id)?.is_some() {
            return Ok(());
        }
        debug!(%model, %external_id, always, "importing dependency");
        let importer = self.env.importer(model)?;
        importer.run(self, external_id, RunOptions::default())?;
        Ok(())
    }

    /// Imports the dependency whose remote id is held in `value`, if any.
    pub fn import_dependency_value(
        &mut self,
        value: Option<&serde_json::Value>,
        model: &str,
        always: bool,
    ) -> SyncResult<()> {
        match value.and_then(ExternalId::from_value) {
            Some(external_id) => self.import_dependency(&external_id, model, always),
            None => Ok(()),
        }
    }
}
