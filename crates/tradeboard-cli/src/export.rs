//! Processed dataset export (CSV and JSON records)

use anyhow::{Context, Result};
use std::path::Path;
use tradeboard_core::{Dataset, Value};

/// File format for `process` output
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Format implied by the file extension, CSV unless it ends in `.json`
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// Write the dataset as CSV with a header row; nulls become empty cells
pub fn write_csv<W: std::io::Write>(dataset: &Dataset, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(dataset.column_names())?;

    for row in 0..dataset.row_count() {
        writer.write_record(dataset.row(row).iter().map(Value::to_string))?;
    }

    writer.flush()?;
    Ok(())
}

/// Dataset as an array of `{column: value}` records
pub fn to_records(dataset: &Dataset) -> serde_json::Value {
    let names = dataset.column_names();

    let records = (0..dataset.row_count())
        .map(|row| {
            let record = names
                .iter()
                .zip(dataset.row(row))
                .map(|(name, value)| (name.to_string(), json_value(value)))
                .collect::<serde_json::Map<_, _>>();
            serde_json::Value::Object(record)
        })
        .collect();

    serde_json::Value::Array(records)
}

fn json_value(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Numeric(n) => serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s),
        Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
        Value::Boolean(b) => serde_json::Value::Bool(b),
    }
}

/// Write the dataset to `path` in `format`
pub fn export(dataset: &Dataset, path: &Path, format: ExportFormat) -> Result<()> {
    match format {
        ExportFormat::Csv => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_csv(dataset, file)
        }
        ExportFormat::Json => {
            let json = serde_json::to_string_pretty(&to_records(dataset))?;
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
        }
    }
}
