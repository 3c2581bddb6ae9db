//! Export-record command implementation.

use super::{parse_external_id, CliError, Replay, RunSummary};
use std::path::Path;
use storelink_engine::jobs::ExportRecordArgs;

/// Runs the export-record command.
///
/// The binding is looked up by its remote id, so it must come from one of
/// the fixture imports.
pub fn run(path: &Path, model: &str, id: &str, fields: &[String]) -> Result<RunSummary, CliError> {
    let replay = Replay::load(path)?;
    let external_id = parse_external_id(id);
    let binding = replay
        .binding_of(model, &external_id)
        .ok_or_else(|| CliError::Usage(format!("no {model} binding for remote id {external_id}")))?;
    let args = ExportRecordArgs {
        model: model.to_string(),
        binding_id: binding.id,
        fields: (!fields.is_empty()).then(|| fields.to_vec()),
    };
    replay.run("export_record", serde_json::to_value(args)?)
}
