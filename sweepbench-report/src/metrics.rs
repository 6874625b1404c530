//! Metrics Aggregation
//!
//! Pure functions from the ordered sample stream to per-algorithm rows and
//! per-family chart datasets. Nothing here is cached; callers recompute on
//! every new sample.

use crate::sample::{RawSample, family};
use serde::Serialize;
use std::collections::BTreeMap;

/// Maximum bubble radius in chart units
pub const MAX_RADIUS: f64 = 20.0;

/// Library size metadata (read, write) in gzip kB, keyed by family
pub type LibSizes = BTreeMap<String, [f64; 2]>;

/// One table row per contiguous run of samples sharing an algorithm id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRow {
    /// Algorithm id including level suffix
    pub algorithm: String,
    /// Input size over compressed size, 1 when unknown
    pub compression_ratio: f64,
    /// Library size metadata for the family, if configured
    pub lib_size_kb: Option<[f64; 2]>,
    /// Per-iteration compression throughput in MB/s (`None` = no sample)
    pub compression: Vec<Option<f64>>,
    /// Per-iteration decompression throughput in MB/s (`None` = no sample)
    pub decompression: Vec<Option<f64>>,
}

/// One point on the comparison chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartDatum {
    /// Algorithm id including level suffix
    pub algorithm: String,
    /// Family the datum is grouped under
    pub family: String,
    /// Mean compression throughput in MB/s (0 when unavailable)
    pub compression_mbps: f64,
    /// Mean decompression throughput in MB/s (0 when unavailable)
    pub decompression_mbps: f64,
    /// Compression ratio, 1 when unknown
    pub ratio: f64,
    /// Bubble radius scaled against the best ratio in the sweep
    pub radius: f64,
}

/// All chart points of one family
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartDataset {
    /// Family name, e.g. `zstd`
    pub family: String,
    /// Points in first-appearance order
    pub data: Vec<ChartDatum>,
}

/// Decimal megabytes per second for processing `total_bytes` in `elapsed_ms`.
///
/// Zero, negative and non-finite timings are "no sample".
pub fn throughput(total_bytes: u64, elapsed_ms: f64) -> Option<f64> {
    if !elapsed_ms.is_finite() || elapsed_ms <= 0.0 {
        return None;
    }
    let mbps = total_bytes as f64 / 1000.0 / 1000.0 / (elapsed_ms / 1000.0);
    mbps.is_finite().then_some(mbps)
}

fn ratio(total_bytes: u64, size: u64) -> Option<f64> {
    (size > 0).then(|| total_bytes as f64 / size as f64)
}

/// Table rows without library metadata
pub fn rows(total_bytes: u64, samples: &[RawSample]) -> Vec<AggregatedRow> {
    rows_with_metadata(total_bytes, samples, &LibSizes::new())
}

/// Table rows, attaching library sizes by family
pub fn rows_with_metadata(
    total_bytes: u64,
    samples: &[RawSample],
    lib_sizes: &LibSizes,
) -> Vec<AggregatedRow> {
    let mut rows: Vec<AggregatedRow> = Vec::new();
    let mut ratio_known = false;

    for sample in samples {
        let id = sample.algorithm();
        let open_new = rows.last().is_none_or(|row| row.algorithm != id);
        if open_new {
            rows.push(AggregatedRow {
                algorithm: id.to_string(),
                compression_ratio: 1.0,
                lib_size_kb: lib_sizes.get(family(id)).copied(),
                compression: Vec::new(),
                decompression: Vec::new(),
            });
            ratio_known = false;
        }

        let Some(row) = rows.last_mut() else {
            continue;
        };
        let mbps = throughput(total_bytes, sample.elapsed_ms());

        match sample {
            RawSample::Compression { size, .. } => {
                if !ratio_known {
                    if let Some(r) = ratio(total_bytes, *size) {
                        row.compression_ratio = r;
                    }
                    ratio_known = true;
                }
                row.compression.push(mbps);
            }
            RawSample::Decompression { .. } => row.decompression.push(mbps),
        }
    }

    rows
}

/// Chart datasets, one per family in lexicographic order
pub fn chart_datasets(total_bytes: u64, samples: &[RawSample]) -> Vec<ChartDataset> {
    let max_ratio = samples
        .iter()
        .filter_map(|s| s.size())
        .filter_map(|size| ratio(total_bytes, size))
        .fold(1.0_f64, f64::max);

    let mut families: Vec<&str> = Vec::new();
    for sample in samples {
        let f = sample.family();
        if !families.contains(&f) {
            families.push(f);
        }
    }
    families.sort_unstable();

    families
        .into_iter()
        .map(|fam| {
            let mut ids: Vec<&str> = Vec::new();
            for sample in samples.iter().filter(|s| s.family() == fam) {
                if !ids.contains(&sample.algorithm()) {
                    ids.push(sample.algorithm());
                }
            }

            let data = ids
                .into_iter()
                .map(|id| chart_datum(total_bytes, samples, id, fam, max_ratio))
                .collect();

            ChartDataset {
                family: fam.to_string(),
                data,
            }
        })
        .collect()
}

fn chart_datum(
    total_bytes: u64,
    samples: &[RawSample],
    id: &str,
    fam: &str,
    max_ratio: f64,
) -> ChartDatum {
    let mut compress_ms = Vec::new();
    let mut decompress_ms = Vec::new();
    let mut first_size = None;

    for sample in samples.iter().filter(|s| s.algorithm() == id) {
        match sample {
            RawSample::Compression {
                elapsed_ms, size, ..
            } => {
                first_size.get_or_insert(*size);
                compress_ms.push(*elapsed_ms);
            }
            RawSample::Decompression { elapsed_ms, .. } => decompress_ms.push(*elapsed_ms),
        }
    }

    let ratio = first_size
        .and_then(|size| ratio(total_bytes, size))
        .unwrap_or(1.0);
    let radius = ratio / max_ratio * MAX_RADIUS;

    ChartDatum {
        algorithm: id.to_string(),
        family: fam.to_string(),
        compression_mbps: mean(&compress_ms)
            .and_then(|ms| throughput(total_bytes, ms))
            .unwrap_or(0.0),
        decompression_mbps: mean(&decompress_ms)
            .and_then(|ms| throughput(total_bytes, ms))
            .unwrap_or(0.0),
        ratio,
        radius: if radius.is_finite() { radius } else { 0.0 },
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        None
    } else {
        Some(finite.iter().sum::<f64>() / finite.len() as f64)
    }
}

/// Two-decimal display form
pub fn format_float(value: f64) -> String {
    format!("{:.2}", value)
}

/// Throughput cell text; an absent or zero value is an empty cell
pub fn format_throughput(value: Option<f64>) -> String {
    match value {
        Some(v) if v > 0.0 && v.is_finite() => format_float(v),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep() -> Vec<RawSample> {
        vec![
            RawSample::compression("zstd-1", 100.0, 50),
            RawSample::decompression("zstd-1", 40.0),
            RawSample::compression("zstd-1", 90.0, 48),
            RawSample::decompression("zstd-1", 38.0),
        ]
    }

    #[test]
    fn test_throughput() {
        // 1 MB in 1 s
        assert_eq!(throughput(1_000_000, 1000.0), Some(1.0));
        assert_eq!(throughput(100, 0.0), None);
        assert_eq!(throughput(100, -1.0), None);
        assert_eq!(throughput(100, f64::NAN), None);
    }

    #[test]
    fn test_rows_single_algorithm() {
        let rows = rows(100, &sweep());
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.algorithm, "zstd-1");
        assert_eq!(row.compression_ratio, 2.0);
        assert_eq!(
            row.compression,
            vec![throughput(100, 100.0), throughput(100, 90.0)]
        );
        assert_eq!(row.decompression.len(), 2);
        assert!(row.lib_size_kb.is_none());
    }

    #[test]
    fn test_rows_open_on_every_id_change() {
        let samples = vec![
            RawSample::compression("a", 1.0, 10),
            RawSample::compression("b", 1.0, 10),
            RawSample::compression("a", 1.0, 5),
        ];
        let rows = rows(100, &samples);
        let ids: Vec<_> = rows.iter().map(|r| r.algorithm.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "a"]);
        assert_eq!(rows[2].compression_ratio, 20.0);
    }

    #[test]
    fn test_rows_decode_only_gets_own_row() {
        let samples = vec![
            RawSample::compression("deflate-9", 4.0, 25),
            RawSample::decompression("deflate-9", 2.0),
            RawSample::decompression("inflate-stream", 1.0),
        ];
        let rows = rows(100, &samples);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].algorithm, "deflate-9");
        assert_eq!(rows[0].decompression.len(), 1);

        let decode_only = &rows[1];
        assert_eq!(decode_only.algorithm, "inflate-stream");
        assert!(decode_only.compression.is_empty());
        assert_eq!(decode_only.decompression, vec![throughput(100, 1.0)]);
        assert_eq!(decode_only.compression_ratio, 1.0);
    }

    #[test]
    fn test_rows_ratio_defaults_to_one() {
        let samples = vec![
            RawSample::decompression("inflate-stream", 2.0),
            RawSample::compression("lz4", 1.0, 0),
        ];
        let rows = rows(100, &samples);
        assert_eq!(rows[0].compression_ratio, 1.0);
        assert_eq!(rows[1].compression_ratio, 1.0);
    }

    #[test]
    fn test_rows_zero_elapsed_is_no_sample() {
        let samples = vec![RawSample::compression("lz4", 0.0, 10)];
        let rows = rows(100, &samples);
        assert_eq!(rows[0].compression, vec![None]);
        assert_eq!(format_throughput(rows[0].compression[0]), "");
    }

    #[test]
    fn test_rows_attach_lib_sizes_by_family() {
        let mut sizes = LibSizes::new();
        sizes.insert("zstd".to_string(), [48.1, 136.0]);
        let rows = rows_with_metadata(100, &sweep(), &sizes);
        assert_eq!(rows[0].lib_size_kb, Some([48.1, 136.0]));
    }

    #[test]
    fn test_chart_datasets_grouping_and_radius() {
        let samples = vec![
            RawSample::compression("zstd-1", 10.0, 50),
            RawSample::decompression("zstd-1", 5.0),
            RawSample::compression("lz4", 10.0, 100),
            RawSample::compression("zstd-3", 20.0, 25),
            RawSample::compression("zstd-3", 40.0, 30),
        ];
        let datasets = chart_datasets(100, &samples);

        let families: Vec<_> = datasets.iter().map(|d| d.family.as_str()).collect();
        assert_eq!(families, vec!["lz4", "zstd"]);

        let zstd = &datasets[1];
        let ids: Vec<_> = zstd.data.iter().map(|d| d.algorithm.as_str()).collect();
        assert_eq!(ids, vec!["zstd-1", "zstd-3"]);

        // best ratio is 4.0 (zstd-3 first sample)
        assert_eq!(zstd.data[1].ratio, 4.0);
        assert_eq!(zstd.data[1].radius, MAX_RADIUS);
        assert_eq!(zstd.data[0].radius, 10.0);

        // mean of 20 and 40 ms
        assert_eq!(zstd.data[1].compression_mbps, throughput(100, 30.0).unwrap());
        assert_eq!(zstd.data[1].decompression_mbps, 0.0);

        let lz4 = &datasets[0].data[0];
        assert_eq!(lz4.ratio, 1.0);
        assert_eq!(lz4.radius, 5.0);
    }

    #[test]
    fn test_chart_datasets_no_nan() {
        let samples = vec![
            RawSample::compression("x", 0.0, 0),
            RawSample::decompression("x", f64::NAN),
        ];
        let datasets = chart_datasets(0, &samples);
        let datum = &datasets[0].data[0];
        assert_eq!(datum.compression_mbps, 0.0);
        assert_eq!(datum.decompression_mbps, 0.0);
        assert_eq!(datum.ratio, 1.0);
        assert!(datum.radius.is_finite());
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(2.0), "2.00");
        assert_eq!(format_float(3.14159), "3.14");
        assert_eq!(format_throughput(Some(0.0)), "");
        assert_eq!(format_throughput(None), "");
        assert_eq!(format_throughput(Some(12.346)), "12.35");
    }
}
