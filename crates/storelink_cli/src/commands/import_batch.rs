//! Import-batch command implementation.

use super::{CliError, Replay, RunSummary};
use chrono::{DateTime, Utc};
use std::path::Path;
use storelink_core::timestamp;
use storelink_engine::jobs::ImportBatchArgs;
use storelink_engine::SearchFilter;

fn parse_date(flag: &str, input: Option<&str>) -> Result<Option<DateTime<Utc>>, CliError> {
    input
        .map(|s| {
            timestamp::parse(s).ok_or_else(|| CliError::Usage(format!("invalid date for --{flag}: {s}")))
        })
        .transpose()
}

/// Runs the import-batch command.
pub fn run(path: &Path, model: &str, from: Option<&str>, to: Option<&str>) -> Result<RunSummary, CliError> {
    let filter = SearchFilter::between(parse_date("from", from)?, parse_date("to", to)?);
    let args = ImportBatchArgs {
        model: model.to_string(),
        filter,
    };
    let replay = Replay::load(path)?;
    replay.run("import_batch", serde_json::to_value(args)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::replay::tests::{fixture_file, shop_fixtures};
    use storelink_shopware::models::SHOP;

    #[test]
    fn shops_are_imported() {
        let file = fixture_file(shop_fixtures());
        let summary = run(file.path(), SHOP, None, None).unwrap();
        assert_eq!(summary.message.as_deref(), Some("1 found, 1 imported, 0 skipped, 0 scheduled"));
        assert_eq!(summary.bindings, 1);
        assert_eq!(summary.remote_calls, 2);
        assert_eq!(summary.remote_writes, 0);
    }

    #[test]
    fn bad_dates_are_rejected() {
        let file = fixture_file(shop_fixtures());
        let err = run(file.path(), SHOP, Some("yesterday"), None).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }

    #[test]
    fn missing_fixture_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&dir.path().join("missing.json"), SHOP, None, None).unwrap_err();
        assert!(matches!(err, CliError::Io(_)));
    }
}
