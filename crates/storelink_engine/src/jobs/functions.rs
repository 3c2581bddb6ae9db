//! Named job functions and their typed arguments.

use crate::adapter::SearchFilter;
use crate::environment::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::importer::RunOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use storelink_core::{BindingId, ExternalId};

/// Signature of job functions. The returned message is stored on the job.
pub type JobFn = fn(&mut SyncContext<'_>, &Value) -> SyncResult<Option<String>>;

/// Arguments of `import_record`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecordArgs {
    /// Binding model.
    pub model: String,
    /// Remote id.
    pub external_id: ExternalId,
    /// Import even when up to date.
    #[serde(default)]
    pub force: bool,
}

/// Arguments of `import_batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatchArgs {
    /// Binding model.
    pub model: String,
    /// Search window and conditions.
    #[serde(default)]
    pub filter: SearchFilter,
}

/// Arguments of `export_record`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecordArgs {
    /// Binding model.
    pub model: String,
    /// Binding to export.
    pub binding_id: BindingId,
    /// Fields that changed, everything when `None`.
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

/// Arguments of `export_delete_record`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRecordArgs {
    /// Binding model.
    pub model: String,
    /// Remote id.
    pub external_id: ExternalId,
}

fn parse<T: serde::de::DeserializeOwned>(function: &str, args: &Value) -> SyncResult<T> {
    serde_json::from_value(args.clone())
        .map_err(|e| SyncError::failed(format!("invalid arguments for {function}: {e}")))
}

fn import_record(ctx: &mut SyncContext<'_>, args: &Value) -> SyncResult<Option<String>> {
    let args: ImportRecordArgs = parse("import_record", args)?;
    let options = RunOptions {
        force: args.force,
        ..RunOptions::default()
    };
    let outcome = ctx.env.importer(&args.model)?.run(ctx, &args.external_id, options)?;
    Ok(outcome.message())
}

fn import_batch(ctx: &mut SyncContext<'_>, args: &Value) -> SyncResult<Option<String>> {
    let args: ImportBatchArgs = parse("import_batch", args)?;
    let report = ctx.env.batch_importer(&args.model)?.run(ctx, &args.filter)?;
    Ok(Some(report.summary()))
}

fn export_record(ctx: &mut SyncContext<'_>, args: &Value) -> SyncResult<Option<String>> {
    let args: ExportRecordArgs = parse("export_record", args)?;
    let outcome = ctx
        .env
        .exporter(&args.model)?
        .run(ctx, args.binding_id, args.fields.as_deref())?;
    Ok(outcome.message())
}

fn export_delete_record(ctx: &mut SyncContext<'_>, args: &Value) -> SyncResult<Option<String>> {
    let args: DeleteRecordArgs = parse("export_delete_record", args)?;
    let message = ctx.env.deleter(&args.model)?.run(&args.external_id)?;
    Ok(Some(message))
}

/// Registry of job functions by name.
#[derive(Clone)]
pub struct JobFunctions {
    functions: HashMap<String, JobFn>,
}

impl JobFunctions {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Creates a registry with `import_record`, `import_batch`,
    /// `export_record` and `export_delete_record`.
    pub fn standard() -> Self {
        let mut functions = Self::empty();
        functions
            .register("import_record", import_record)
            .register("import_batch", import_batch)
            .register("export_record", export_record)
            .register("export_delete_record", export_delete_record);
        functions
    }

    /// Registers a function.
    pub fn register(&mut self, name: &str, function: JobFn) -> &mut Self {
        self.functions.insert(name.to_string(), function);
        self
    }

    /// Returns a function.
    pub fn get(&self, name: &str) -> Option<JobFn> {
        self.functions.get(name).copied()
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for JobFunctions {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for JobFunctions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobFunctions").field("names", &self.names()).finish()
    }
}
