use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::{FetcherError, Result};
use crate::mapper::FieldMap;

/// Column of the export CSV carrying the JSON payload.
const PAYLOAD_COLUMN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    pub source_key: String,
    pub rows: usize,
    pub output: PathBuf,
}

/// Converts an export CSV (`_airbyte_ab_id`, `_airbyte_emitted_at`,
/// `_airbyte_data`) into one mapped JSON record per line.
///
/// The first row is a header. A payload that is missing or not valid JSON
/// aborts the whole transform.
pub fn transform(
    field_map: &FieldMap,
    source: &Path,
    output: &Path,
    source_key: &str,
) -> Result<TransformReport> {
    if !field_map.can_map(source_key) {
        return Err(FetcherError::UnknownSourceKey(source_key.to_string()));
    }
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(source)?;
    let mut writer = BufWriter::new(File::create(output)?);

    let mut rows = 0;
    for (idx, record) in reader.records().enumerate() {
        let row = idx + 1;
        let record = record?;
        let payload = record.get(PAYLOAD_COLUMN).ok_or_else(|| FetcherError::MalformedRow {
            row,
            reason: format!("expected {} columns, found {}", PAYLOAD_COLUMN + 1, record.len()),
        })?;
        let raw: Value = serde_json::from_str(payload).map_err(|e| FetcherError::MalformedRow {
            row,
            reason: format!("payload is not valid JSON: {e}"),
        })?;
        let mapped = field_map.map_row(&raw, source_key)?;
        serde_json::to_writer(&mut writer, &mapped)?;
        writer.write_all(b"\n")?;
        rows += 1;
    }
    writer.flush()?;

    log::info!("Generated {}", output.display());
    Ok(TransformReport {
        source_key: source_key.to_string(),
        rows,
        output: output.to_path_buf(),
    })
}
