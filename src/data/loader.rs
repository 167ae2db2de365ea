//! Data loading utilities
//!
//! Reads raw customer exports into a polars [`DataFrame`]:
//! - nested JSON exports are flattened, each leaf keyed by its own name
//! - CSV files are read with the polars CSV reader

use super::frame::from_records;
use super::{RawValue, Record};
use crate::error::{ChurnError, Result};
use polars::prelude::*;
use serde_json::Value;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Load a JSON array of (possibly nested) customer objects
pub fn load_json(path: impl AsRef<Path>) -> Result<DataFrame> {
    let start = Instant::now();
    let text = std::fs::read_to_string(path.as_ref())?;
    let df = parse_json(&text)?;
    info!(
        path = %path.as_ref().display(),
        rows = df.height(),
        fields = df.width(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Loaded JSON records"
    );
    Ok(df)
}

/// Parse a JSON array of customer objects.
///
/// `{"customer": {"gender": "Male"}, "account": {"Charges": {"Total": "1.5"}}}`
/// becomes the flat record `{gender: "Male", Total: "1.5"}`. Two leaves with the
/// same name in one object are a [`ChurnError::DataError`].
pub fn parse_json(text: &str) -> Result<DataFrame> {
    let value: Value = serde_json::from_str(text)?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(ChurnError::DataError(format!(
                "expected a JSON array of records, found {}",
                json_kind(&other)
            )))
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let mut record = Record::new();
        flatten_into(item, &mut record, i)?;
        records.push(record);
    }

    from_records(records)
}

fn flatten_into(value: &Value, record: &mut Record, row: usize) -> Result<()> {
    let object = value.as_object().ok_or_else(|| {
        ChurnError::DataError(format!("record {} is a {}, not an object", row, json_kind(value)))
    })?;

    for (key, child) in object {
        if child.is_object() {
            flatten_into(child, record, row)?;
            continue;
        }
        if record.get(key).is_some() {
            return Err(ChurnError::DataError(format!(
                "record {}: field '{}' appears twice after flattening",
                row, key
            )));
        }
        record.insert(key.clone(), leaf_value(child, key, row)?);
    }
    Ok(())
}

fn leaf_value(value: &Value, key: &str, row: usize) -> Result<RawValue> {
    match value {
        Value::Null => Ok(RawValue::Missing),
        Value::Bool(b) => Ok(RawValue::Bool(*b)),
        Value::Number(n) => n
            .as_f64()
            .map(RawValue::Number)
            .ok_or_else(|| ChurnError::DataError(format!("record {}: '{}' is out of range", row, key))),
        Value::String(s) => Ok(RawValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(ChurnError::DataError(format!(
            "record {}: field '{}' holds a {}, expected a scalar",
            row,
            key,
            json_kind(value)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Load a CSV file with a header row
pub fn load_csv(path: impl AsRef<Path>) -> Result<DataFrame> {
    let start = Instant::now();
    let file = File::open(path.as_ref())?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(file)
        .finish()?;

    info!(
        path = %path.as_ref().display(),
        rows = df.height(),
        fields = df.width(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Loaded CSV records"
    );
    Ok(df)
}

/// Load either format, dispatching on the file extension
pub fn load_records(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "json" => load_json(path),
        Some(ext) if ext == "csv" => load_csv(path),
        other => Err(ChurnError::DataError(format!(
            "unsupported file extension {:?} for {}",
            other,
            path.display()
        ))),
    }
}

/// Write a frame as CSV with a header row
pub fn write_csv(df: &DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let mut df = df.clone();
    let mut file = File::create(path.as_ref())?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    debug!(path = %path.as_ref().display(), rows = df.height(), "Wrote CSV records");
    Ok(())
}
