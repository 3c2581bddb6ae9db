//! CLI command implementations.

pub mod export_record;
pub mod import_batch;
pub mod import_record;
mod replay;

pub use replay::{Replay, RunSummary};

use storelink_core::ExternalId;
use storelink_engine::SyncError;
use thiserror::Error;

/// Errors of the CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The fixture file could not be read.
    #[error("cannot read fixtures: {0}")]
    Io(#[from] std::io::Error),

    /// The fixture file is not valid.
    #[error("invalid fixtures: {0}")]
    Fixtures(#[from] serde_json::Error),

    /// The command itself failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Bad command-line argument.
    #[error("{0}")]
    Usage(String),
}

/// Reads a remote id typed on the command line.
///
/// Digits give a numeric id, anything else a textual one.
pub fn parse_external_id(input: &str) -> ExternalId {
    input
        .parse::<i64>()
        .map_or_else(|_| ExternalId::from(input), ExternalId::Int)
}

/// Prints a run summary.
pub fn print(summary: &RunSummary, format: &str) -> Result<(), CliError> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
        _ => print_text_output(summary),
    }
    Ok(())
}

fn print_text_output(summary: &RunSummary) {
    println!("Command: {}", summary.function);
    if let Some(message) = &summary.message {
        println!("Result: {message}");
    }
    println!();
    println!("Jobs:");
    println!("  Done:      {}", summary.jobs_done);
    println!("  Postponed: {}", summary.jobs_postponed);
    println!("  Failed:    {}", summary.jobs_failed);
    println!();
    println!("Bindings:     {}", summary.bindings);
    println!("Remote calls: {} ({} writes)", summary.remote_calls, summary.remote_writes);

    if !summary.failures.is_empty() {
        println!();
        println!("Failures:");
        for failure in &summary.failures {
            println!(
                "  {} {}: {}",
                failure.function,
                failure.model.as_deref().unwrap_or("-"),
                failure.error
            );
        }
    }
}
