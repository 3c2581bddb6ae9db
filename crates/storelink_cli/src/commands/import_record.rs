//! Import-record command implementation.

use super::{parse_external_id, CliError, Replay, RunSummary};
use std::path::Path;
use storelink_engine::jobs::ImportRecordArgs;

/// Runs the import-record command.
pub fn run(path: &Path, model: &str, id: &str, force: bool) -> Result<RunSummary, CliError> {
    let args = ImportRecordArgs {
        model: model.to_string(),
        external_id: parse_external_id(id),
        force,
    };
    let replay = Replay::load(path)?;
    replay.run("import_record", serde_json::to_value(args)?)
}
