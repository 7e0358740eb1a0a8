use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, AsArray, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde_json::{Map, Value as JsonValue};

use super::model::{ScanRecord, SelectionTable, FIXED_COLUMNS};

/// Columns that are derived from others and therefore not read back.
const DERIVED_COLUMNS: [&str; 1] = ["path"];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Write a selection table to a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one nullable Utf8 column per table column
/// * `.json`    – `[{ "subject": "4011", "task": null, ... }, ...]`
/// * `.csv`     – header row, empty cell for null
pub fn save_table(table: &SelectionTable, path: &Path) -> Result<()> {
    match extension(path).as_str() {
        "parquet" | "pq" => save_parquet(table, path),
        "json" => save_json(table, path),
        "csv" => save_csv(table, path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// Load a selection table written by [`save_table`].
pub fn load_table(path: &Path) -> Result<SelectionTable> {
    let rows = match extension(path).as_str() {
        "parquet" | "pq" => load_parquet(path)?,
        "json" => load_json(path)?,
        "csv" => load_csv(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };
    let records = rows
        .into_iter()
        .enumerate()
        .map(|(i, cells)| record_from_cells(cells).with_context(|| format!("Row {i}")))
        .collect::<Result<Vec<_>>>()?;
    Ok(SelectionTable::from_records(records)?)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

type Cells = BTreeMap<String, Option<String>>;

fn record_from_cells(mut cells: Cells) -> Result<ScanRecord> {
    let mut take = |col: &str| -> Result<String> {
        cells
            .remove(col)
            .flatten()
            .with_context(|| format!("missing value for required column '{col}'"))
    };
    let measurement = PathBuf::from(take("measurement")?);
    let subject = take("subject")?;
    let session = take("session")?;
    let scan = take("scan")?;
    let scan_type = take("scan_type")?;
    let modality = cells.remove("modality").flatten();

    let fields = cells
        .into_iter()
        .filter(|(col, _)| !DERIVED_COLUMNS.contains(&col.as_str()))
        .filter_map(|(col, val)| val.map(|v| (col, v)))
        .collect();

    Ok(ScanRecord {
        measurement,
        subject,
        session,
        scan,
        scan_type,
        modality,
        fields,
    })
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

fn save_json(table: &SelectionTable, path: &Path) -> Result<()> {
    let rows: Vec<JsonValue> = table
        .records()
        .iter()
        .map(|rec| {
            let obj: Map<String, JsonValue> = table
                .column_names
                .iter()
                .map(|col| {
                    let cell = rec.get(col).map(JsonValue::String).unwrap_or(JsonValue::Null);
                    (col.clone(), cell)
                })
                .collect();
            JsonValue::Object(obj)
        })
        .collect();
    let text = serde_json::to_string_pretty(&rows).context("serializing JSON")?;
    std::fs::write(path, text).context("writing JSON file")
}

fn load_json(path: &Path) -> Result<Vec<Cells>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    records
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            let obj = rec
                .as_object()
                .with_context(|| format!("Row {i} is not a JSON object"))?;
            Ok(obj
                .iter()
                .map(|(key, val)| (key.clone(), json_to_cell(val)))
                .collect())
        })
        .collect()
}

fn json_to_cell(val: &JsonValue) -> Option<String> {
    match val {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn save_csv(table: &SelectionTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    writer
        .write_record(&table.column_names)
        .context("writing CSV header")?;
    for rec in table.records() {
        let row: Vec<String> = table
            .column_names
            .iter()
            .map(|col| rec.get(col).unwrap_or_default())
            .collect();
        writer.write_record(&row).context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

fn load_csv(path: &Path) -> Result<Vec<Cells>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    for col in FIXED_COLUMNS.iter().filter(|c| **c != "modality") {
        if !headers.iter().any(|h| h == col) {
            bail!("CSV missing '{col}' column");
        }
    }

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let cells: Cells = headers
            .iter()
            .zip(record.iter())
            .map(|(col, value)| {
                let cell = (!value.is_empty()).then(|| value.to_string());
                (col.clone(), cell)
            })
            .collect();
        rows.push(cells);
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn save_parquet(table: &SelectionTable, path: &Path) -> Result<()> {
    let fields: Vec<Field> = table
        .column_names
        .iter()
        .map(|col| Field::new(col, DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let columns: Vec<ArrayRef> = table
        .column_names
        .iter()
        .map(|col| {
            let values: Vec<Option<String>> =
                table.records().iter().map(|rec| rec.get(col)).collect();
            Arc::new(StringArray::from(values)) as ArrayRef
        })
        .collect();

    let batch =
        RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn load_parquet(path: &Path) -> Result<Vec<Cells>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let columns: Vec<(String, &ArrayRef)> = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(f, col)| (f.name().clone(), col))
            .collect();

        for row in 0..batch.num_rows() {
            let mut cells = Cells::new();
            for (name, col) in &columns {
                let value = extract_string(col, row)
                    .with_context(|| format!("Row {row}: failed to read '{name}'"))?;
                cells.insert(name.clone(), value);
            }
            rows.push(cells);
        }
    }

    Ok(rows)
}

/// Extract a nullable string cell from a Utf8 or LargeUtf8 column.
fn extract_string(col: &ArrayRef, row: usize) -> Result<Option<String>> {
    if col.is_null(row) {
        return Ok(None);
    }
    match col.data_type() {
        DataType::Utf8 => Ok(Some(col.as_string::<i32>().value(row).to_string())),
        DataType::LargeUtf8 => Ok(Some(col.as_string::<i64>().value(row).to_string())),
        other => bail!("Expected Utf8 column, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::record;

    fn sample() -> SelectionTable {
        let mut with_modality = record("5706", "ofMpF", "5", &[("task", "CogB"), ("acquisition", "EPI")]);
        with_modality.modality = Some("cbv".into());
        SelectionTable::from_records(vec![
            record("4011", "ofMaF", "3", &[("acquisition", "TurboRARElowcov")]),
            with_modality,
        ])
        .unwrap()
    }

    fn reload(ext: &str) -> SelectionTable {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("selection.{ext}"));
        save_table(&sample(), &path).unwrap();
        load_table(&path).unwrap()
    }

    #[test]
    fn csv_preserves_nulls_and_harvested_columns() {
        let table = reload("csv");
        assert_eq!(table.records(), sample().records());
        assert_eq!(table.records()[0].get("task"), None);
    }

    #[test]
    fn json_and_parquet_reload_the_same_rows() {
        assert_eq!(reload("json").records(), sample().records());
        assert_eq!(reload("parquet").records(), sample().records());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = save_table(&sample(), &dir.path().join("selection.xlsx")).unwrap_err();
        assert!(err.to_string().contains(".xlsx"));
    }

    #[test]
    fn csv_without_required_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.csv");
        std::fs::write(&path, "subject,session\n4011,ofMaF\n").unwrap();
        assert!(load_table(&path).is_err());
    }
}
