//! JSON and CSV Export
//!
//! One-shot serialization of a finished (or partial) sweep. Both formats keep
//! the original sample order.

use crate::metrics::format_float;
use crate::sample::{Action, RawSample};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// CSV header row
pub const CSV_HEADER: [&str; 5] = [
    "Algorithm",
    "Action",
    "Elapsed (ms)",
    "Compressed Size (bytes)",
    "Compression Ratio",
];

/// Errors while serializing an export
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Pretty-printed JSON document
    Json,
    /// Comma-separated values with header
    Csv,
}

impl ExportFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("Unknown export format: {}", other)),
        }
    }
}

/// Top-level JSON document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepExport {
    /// Input file name
    pub filename: String,
    /// Input size in bytes
    pub file_size_bytes: u64,
    /// ISO-8601 UTC timestamp with milliseconds
    pub timestamp: String,
    /// One entry per sample
    pub results: Vec<ExportEntry>,
}

/// One sample in the JSON document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEntry {
    /// Algorithm id including level suffix
    pub algorithm: String,
    /// Operation direction
    pub action: Action,
    /// Wall-clock milliseconds
    pub elapsed_ms: f64,
    /// Compressed size, compression entries only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_size_bytes: Option<u64>,
    /// Ratio rounded to two decimals, compression entries only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<f64>,
}

fn compression_ratio(file_size: u64, size: u64) -> Option<f64> {
    if size == 0 {
        return None;
    }
    let ratio = file_size as f64 / size as f64;
    Some((ratio * 100.0).round() / 100.0)
}

impl SweepExport {
    /// Build the export document
    pub fn new(
        filename: impl Into<String>,
        file_size_bytes: u64,
        samples: &[RawSample],
        timestamp: DateTime<Utc>,
    ) -> Self {
        let results = samples
            .iter()
            .map(|sample| ExportEntry {
                algorithm: sample.algorithm().to_string(),
                action: sample.action(),
                elapsed_ms: sample.elapsed_ms(),
                compressed_size_bytes: sample.size(),
                compression_ratio: sample
                    .size()
                    .and_then(|size| compression_ratio(file_size_bytes, size)),
            })
            .collect();

        Self {
            filename: filename.into(),
            file_size_bytes,
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            results,
        }
    }
}

/// Serialize a sweep to pretty-printed JSON
pub fn export_json(
    filename: &str,
    file_size_bytes: u64,
    samples: &[RawSample],
    timestamp: DateTime<Utc>,
) -> Result<String, ExportError> {
    let document = SweepExport::new(filename, file_size_bytes, samples, timestamp);
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Serialize a sweep to CSV
pub fn export_csv(file_size_bytes: u64, samples: &[RawSample]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for sample in samples {
        let (size, ratio) = match sample.size() {
            Some(size) => (
                size.to_string(),
                if size == 0 {
                    String::new()
                } else {
                    format_float(file_size_bytes as f64 / size as f64)
                },
            ),
            None => (String::new(), String::new()),
        };

        let elapsed = sample.elapsed_ms().to_string();
        writer.write_record([
            sample.algorithm(),
            sample.action().as_str(),
            elapsed.as_str(),
            size.as_str(),
            ratio.as_str(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Serialize in the requested format
pub fn export(
    format: ExportFormat,
    filename: &str,
    file_size_bytes: u64,
    samples: &[RawSample],
    timestamp: DateTime<Utc>,
) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => export_json(filename, file_size_bytes, samples, timestamp),
        ExportFormat::Csv => export_csv(file_size_bytes, samples),
    }
}

/// `compression-benchmark-{stem}-{YYYY-MM-DD}.{ext}`
pub fn export_file_name(filename: &str, format: ExportFormat, date: NaiveDate) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("input");

    format!(
        "compression-benchmark-{}-{}.{}",
        stem,
        date.format("%Y-%m-%d"),
        format.extension()
    )
}
