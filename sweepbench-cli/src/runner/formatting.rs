//! Output Formatting
//!
//! Human-readable output for sweeps, plans and allocation runs.

use super::allocation::AllocationLog;
use super::execution::SweepResult;
use super::machine::Termination;
use crate::planner::PlanSummary;
use sweepbench_core::Registry;
use sweepbench_report::{
    ChartDataset, ChartView, LibSizes, SelectionStore, TableView, chart_datasets, format_float,
    format_throughput, rows_with_metadata,
};

fn cells(values: &[Option<f64>]) -> String {
    values
        .iter()
        .map(|v| format!("{:>9}", format_throughput(*v)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn lib_size_cell(lib_size: Option<[f64; 2]>) -> String {
    match lib_size {
        Some([read, write]) => format!("{}/{}", format_float(read), format_float(write)),
        None => String::new(),
    }
}

/// Format a sweep for terminal display.
///
/// Rows and chart points for ids active in `store` are marked with `>`.
pub fn format_human_output(
    result: &SweepResult,
    lib_sizes: &LibSizes,
    store: &SelectionStore,
) -> String {
    let data = &result.data;
    let mut output = String::new();

    output.push('\n');
    output.push_str(&format!(
        "SweepBench Results: {} ({} bytes)\n",
        data.filename, data.total_bytes
    ));
    output.push_str(&"=".repeat(78));
    output.push_str("\n\n");

    let table = TableView::new(store, rows_with_metadata(data.total_bytes, &data.samples, lib_sizes));
    output.push_str(&format!(
        "  {:<18} {:>7} {:>15}  {}\n",
        "algorithm", "ratio", "lib kB (r/w)", "compress MB/s | decompress MB/s"
    ));
    output.push_str(&"-".repeat(78));
    output.push('\n');

    for row in table.rows() {
        let marker = if table.is_active(&row.algorithm) { ">" } else { " " };
        output.push_str(&format!(
            "{} {:<18} {:>7} {:>15}  {} | {}\n",
            marker,
            row.algorithm,
            format_float(row.compression_ratio),
            lib_size_cell(row.lib_size_kb),
            cells(&row.compression),
            cells(&row.decompression),
        ));
    }

    let mut chart = ChartView::new(store, chart_datasets(data.total_bytes, &data.samples));
    chart.sync();
    if !chart.datasets().is_empty() {
        output.push('\n');
        output.push_str(&format_chart_summary(chart.datasets(), |algorithm| {
            table.is_active(algorithm)
        }));
    }

    if !result.skipped.is_empty() {
        output.push_str(&format!(
            "\nSkipped (reference payload not planned): {}\n",
            result.skipped.join(", ")
        ));
    }

    output.push('\n');
    let icon = match &result.termination {
        Termination::Completed => "✓",
        Termination::Cancelled => "⊘",
        Termination::Failed { .. } => "✗",
    };
    output.push_str(&format!(
        "{} Sweep {} with {} samples\n",
        icon,
        result.termination,
        data.samples.len()
    ));

    output
}

/// Mean throughput per algorithm, grouped by family
fn format_chart_summary(datasets: &[ChartDataset], is_active: impl Fn(&str) -> bool) -> String {
    let mut output = String::new();
    output.push_str("Averages by family\n");
    output.push_str(&"-".repeat(78));
    output.push('\n');

    for dataset in datasets {
        output.push_str(&format!("  {}\n", dataset.family));
        for datum in &dataset.data {
            let marker = if is_active(&datum.algorithm) { ">" } else { " " };
            output.push_str(&format!(
                "  {}   {:<16} compress: {:>9} MB/s  decompress: {:>9} MB/s  ratio: {:>6}  r: {:>5}\n",
                marker,
                datum.algorithm,
                format_float(datum.compression_mbps),
                format_float(datum.decompression_mbps),
                format_float(datum.ratio),
                format_float(datum.radius),
            ));
        }
    }
    output
}

/// Format a dry-run plan
pub fn format_plan(summary: &PlanSummary) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Sweep plan: {} tasks, {} iteration(s) per level\n\n",
        summary.total_tasks, summary.iterations
    ));
    for (id, count) in &summary.per_algorithm {
        output.push_str(&format!("  {:<20} {} tasks\n", id, count));
    }
    for id in &summary.skipped {
        output.push_str(&format!("  {:<20} skipped (reference payload not planned)\n", id));
    }
    output
}

/// Format the registered collaborators
pub fn format_registry(registry: &Registry) -> String {
    let mut output = String::new();
    output.push_str("Codecs:\n");
    for codec in registry.codecs() {
        let levels = if codec.levels.is_empty() {
            "-".to_string()
        } else {
            codec
                .levels
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        let kind = match codec.reference {
            Some(reference) if codec.is_decode_only() => format!(
                "decode-only, reference {}-{} #{}",
                reference.codec,
                reference
                    .level
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "default".to_string()),
                reference.iteration
            ),
            _ => "round-trip".to_string(),
        };
        output.push_str(&format!(
            "  {:<16} levels: {:<10} {:<40} {}\n",
            codec.id, levels, kind, codec.name
        ));
    }

    output.push_str("\nAllocators:\n");
    for allocator in registry.allocators() {
        output.push_str(&format!("  {:<16} {}\n", allocator.id, allocator.name));
    }
    output
}

/// Format allocation results, newest first
pub fn format_allocation_log(log: &AllocationLog) -> String {
    let mut output = String::new();
    for result in log.iter() {
        output.push_str(&format!(
            "  {}  {:<12} {:>8} iterations  {:>10} ms\n",
            result.finished_at.format("%H:%M:%S%.3f"),
            result.allocator,
            result.iterations,
            format_float(result.elapsed_ms)
        ));
    }
    output
}
