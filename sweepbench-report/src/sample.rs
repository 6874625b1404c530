//! Raw Sample Stream

use serde::{Deserialize, Serialize};

/// Direction of a timed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Encode
    Compression,
    /// Decode
    Decompression,
}

impl Action {
    /// Lowercase name used in exports
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Compression => "compression",
            Action::Decompression => "decompression",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed timed operation.
///
/// Only compression samples carry an output size, so the variant decides
/// whether `size` exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RawSample {
    /// Encode run with its output size in bytes
    Compression {
        /// Algorithm id including level suffix, e.g. `zstd-3`
        algorithm: String,
        /// Wall-clock milliseconds
        elapsed_ms: f64,
        /// Compressed size in bytes
        size: u64,
    },
    /// Decode run
    Decompression {
        /// Algorithm id including level suffix
        algorithm: String,
        /// Wall-clock milliseconds
        elapsed_ms: f64,
    },
}

impl RawSample {
    /// Build a compression sample
    pub fn compression(algorithm: impl Into<String>, elapsed_ms: f64, size: u64) -> Self {
        RawSample::Compression {
            algorithm: algorithm.into(),
            elapsed_ms,
            size,
        }
    }

    /// Build a decompression sample
    pub fn decompression(algorithm: impl Into<String>, elapsed_ms: f64) -> Self {
        RawSample::Decompression {
            algorithm: algorithm.into(),
            elapsed_ms,
        }
    }

    /// Algorithm id including level suffix
    pub fn algorithm(&self) -> &str {
        match self {
            RawSample::Compression { algorithm, .. } | RawSample::Decompression { algorithm, .. } => {
                algorithm
            }
        }
    }

    /// Operation direction
    pub fn action(&self) -> Action {
        match self {
            RawSample::Compression { .. } => Action::Compression,
            RawSample::Decompression { .. } => Action::Decompression,
        }
    }

    /// Elapsed wall-clock milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        match self {
            RawSample::Compression { elapsed_ms, .. }
            | RawSample::Decompression { elapsed_ms, .. } => *elapsed_ms,
        }
    }

    /// Compressed size, present only for compression samples
    pub fn size(&self) -> Option<u64> {
        match self {
            RawSample::Compression { size, .. } => Some(*size),
            RawSample::Decompression { .. } => None,
        }
    }

    /// Family of this sample's algorithm
    pub fn family(&self) -> &str {
        family(self.algorithm())
    }
}

/// Strip a trailing `-<level>` suffix: `zstd-3` becomes `zstd`.
///
/// Ids whose last segment is not a number are returned unchanged, so
/// `inflate-stream` stays whole. Negative levels (`zstd--5`) are handled.
pub fn family(algorithm: &str) -> &str {
    match algorithm.rsplit_once('-') {
        Some((prefix, suffix))
            if !prefix.is_empty()
                && !suffix.is_empty()
                && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            match prefix.strip_suffix('-') {
                Some(base) if !base.is_empty() => base,
                _ => prefix,
            }
        }
        _ => algorithm,
    }
}
