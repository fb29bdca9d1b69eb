//! CSV export of all selections.

use chrono::SecondsFormat;
use serde_json::Value;

use common::errors::{AppError, AppResult};
use common::models::{Selection, SNAPSHOT_LIMIT};

const FIXED_HEADERS: [&str; 4] = ["connection", "table", "column", "last_synced_at"];

/// Writes one row per selection with exactly [`SNAPSHOT_LIMIT`] positional value columns.
pub fn write_csv(selections: &[Selection]) -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<String> = FIXED_HEADERS.iter().map(|h| h.to_string()).collect();
    header.extend((1..=SNAPSHOT_LIMIT).map(|i| format!("value_{i}")));
    writer.write_record(&header).map_err(csv_err)?;

    for selection in selections {
        let mut record = vec![
            selection.connection_name.clone(),
            selection.table_name.clone(),
            selection.column_name.clone(),
            selection
                .last_synced_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
        ];
        record.extend(
            selection
                .positional_values(SNAPSHOT_LIMIT)
                .iter()
                .map(cell),
        );
        writer.write_record(&record).map_err(csv_err)?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("cannot finish CSV export: {e}")))
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn csv_err(e: csv::Error) -> AppError {
    AppError::Internal(format!("cannot write CSV export: {e}"))
}
