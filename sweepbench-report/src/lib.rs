#![warn(missing_docs)]
//! SweepBench Report - Aggregation and Export
//!
//! Everything that happens to samples after they are measured:
//! - Metrics aggregation into table rows and chart datasets
//! - JSON and CSV export
//! - Selection sync between the table and chart views

mod export;
mod metrics;
mod sample;
mod selection;
mod views;

pub use export::{
    CSV_HEADER, ExportEntry, ExportError, ExportFormat, SweepExport, export, export_csv,
    export_file_name, export_json,
};
pub use metrics::{
    AggregatedRow, ChartDataset, ChartDatum, LibSizes, MAX_RADIUS, chart_datasets, format_float,
    format_throughput, rows, rows_with_metadata, throughput,
};
pub use sample::{Action, RawSample, family};
pub use selection::{Selection, SelectionStore, SubscriptionId};
pub use views::{ChartElement, ChartView, TableView};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable terminal output
    Human,
    /// JSON export document
    Json,
    /// CSV export
    Csv,
}

impl OutputFormat {
    /// Export format backing this output, if any
    pub fn export_format(&self) -> Option<ExportFormat> {
        match self {
            OutputFormat::Human => None,
            OutputFormat::Json => Some(ExportFormat::Json),
            OutputFormat::Csv => Some(ExportFormat::Csv),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}
