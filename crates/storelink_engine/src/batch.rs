//! Batch importers.
//!
//! A batch importer searches the remote ids of a model for a date window and
//! imports each of them, either right away in the current transaction or as
//! one deferred job per record.

use crate::adapter::SearchFilter;
use crate::environment::SyncContext;
use crate::error::SyncResult;
use crate::importer::{ImportOutcome, RunOptions};
use crate::jobs::JobRequest;
use storelink_core::ExternalId;
use tracing::{debug, info};
use uuid::Uuid;

/// How a batch imports the records it found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Import each record in the current transaction.
    Direct,
    /// Schedule one `import_record` job per record.
    Deferred {
        /// Job priority, default priority when `None`.
        priority: Option<u32>,
    },
}

impl BatchMode {
    /// Deferred mode with the default priority.
    pub const fn deferred() -> Self {
        BatchMode::Deferred { priority: None }
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Remote ids found by the search.
    pub found: usize,
    /// Records imported directly.
    pub imported: usize,
    /// Records skipped by direct imports.
    pub skipped: usize,
    /// Jobs scheduled for deferred imports.
    pub scheduled: Vec<Uuid>,
}

impl BatchReport {
    /// Message recorded as the job result.
    pub fn summary(&self) -> String {
        format!(
            "{} found, {} imported, {} skipped, {} scheduled",
            self.found,
            self.imported,
            self.skipped,
            self.scheduled.len()
        )
    }
}

/// A batch importer.
///
/// The default `run` searches with the adapter of the model and imports
/// every id it returns according to `mode`.
pub trait BatchImport: Send + Sync {
    /// Binding model imported.
    fn model(&self) -> &str;

    /// How found records are imported.
    fn mode(&self) -> BatchMode;

    /// Returns the remote ids to import.
    fn search(&self, ctx: &mut SyncContext<'_>, filter: &SearchFilter) -> SyncResult<Vec<ExternalId>> {
        ctx.env.adapter(self.model())?.search(filter)
    }

    /// Runs the batch.
    fn run(&self, ctx: &mut SyncContext<'_>, filter: &SearchFilter) -> SyncResult<BatchReport> {
        let ids = self.search(ctx, filter)?;
        info!(model = %self.model(), found = ids.len(), "batch search done");
        let mut report = BatchReport {
            found: ids.len(),
            ..BatchReport::default()
        };
        for external_id in &ids {
            import_found(ctx, self.model(), self.mode(), external_id, &mut report)?;
        }
        Ok(report)
    }
}

/// Imports one record found by a batch, directly or through a job.
pub fn import_found(
    ctx: &mut SyncContext<'_>,
    model: &str,
    mode: BatchMode,
    external_id: &ExternalId,
    report: &mut BatchReport,
) -> SyncResult<()> {
    match mode {
        BatchMode::Direct => {
            let outcome = ctx.env.importer(model)?.run(ctx, external_id, RunOptions::default())?;
            match outcome {
                ImportOutcome::Imported { .. } => report.imported += 1,
                ImportOutcome::Skipped(_) => report.skipped += 1,
            }
        }
        BatchMode::Deferred { priority } => {
            let mut request = JobRequest::import_record(ctx.backend_id(), model, external_id, false);
            if let Some(priority) = priority {
                request = request.with_priority(priority);
            }
            let job = ctx.schedule(request);
            debug!(%model, %external_id, %job, "import scheduled");
            report.scheduled.push(job);
        }
    }
    Ok(())
}

/// Batch importer with the default search and a fixed mode.
#[derive(Debug, Clone)]
pub struct ModelBatchImporter {
    model: String,
    mode: BatchMode,
}

impl ModelBatchImporter {
    /// Imports each record in the current transaction.
    pub fn direct(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            mode: BatchMode::Direct,
        }
    }

    /// Schedules one job per record.
    pub fn deferred(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            mode: BatchMode::deferred(),
        }
    }

    /// Sets the priority of scheduled jobs.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.mode = BatchMode::Deferred {
            priority: Some(priority),
        };
        self
    }
}

impl BatchImport for ModelBatchImporter {
    fn model(&self) -> &str {
        &self.model
    }

    fn mode(&self) -> BatchMode {
        self.mode
    }
}
