//! Configuration loading from sweep.toml
//!
//! SweepBench configuration can be specified in a `sweep.toml` file in the project root.
//! The configuration is discovered by walking up from the current directory.
//! Command line flags override whatever the file sets.

use crate::planner::AlgorithmConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sweepbench_report::LibSizes;
use thiserror::Error;

/// File name looked up during discovery
pub const CONFIG_FILE: &str = "sweep.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("Unknown algorithm '{0}' in configuration")]
    UnknownAlgorithm(String),
}

/// SweepBench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SweepConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Per-algorithm overrides, keyed by family id
    #[serde(default)]
    pub algorithms: BTreeMap<String, AlgorithmOverride>,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where timed operations execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationMode {
    /// Dedicated worker process per sweep (default)
    #[default]
    Process,
    /// Dedicated thread in this process, useful for debugging
    InProcess,
}

impl IsolationMode {
    /// Whether this mode provides process isolation
    pub fn is_isolated(self) -> bool {
        matches!(self, IsolationMode::Process)
    }
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Iterations per level
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Isolation mode: "process" or "in-process"
    #[serde(default)]
    pub isolation: IsolationMode,
    /// Per-call timeout for the worker (e.g. "60s", "5m")
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            isolation: IsolationMode::default(),
            worker_timeout: default_worker_timeout(),
        }
    }
}

fn default_iterations() -> u32 {
    3
}
fn default_worker_timeout() -> String {
    "60s".to_string()
}

/// Overrides for one algorithm family. Unset fields keep the registry default.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AlgorithmOverride {
    /// Include or exclude the family
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Replacement level list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<i32>>,
    /// Library (read, write) size in gzip kB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lib_size_kb: Option<[f64; 2]>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human", "json", "csv"
    #[serde(default = "default_format")]
    pub format: String,
    /// Directory for exported files
    #[serde(default = "default_output_dir")]
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            directory: default_output_dir(),
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}
fn default_output_dir() -> String {
    "target/sweepbench".to_string()
}

impl SweepConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Find `sweep.toml` in `start` or any of its ancestors
    pub fn find(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.is_file() {
                return Some(config_path);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Discover and load configuration from the current directory upwards.
    ///
    /// A missing file yields `Ok(None)`; a file that fails to load is an error.
    pub fn discover() -> Result<Option<Self>, ConfigError> {
        let Ok(cwd) = std::env::current_dir() else {
            return Ok(None);
        };
        match Self::find(&cwd) {
            Some(path) => {
                tracing::debug!("loading configuration from {}", path.display());
                Self::load(&path).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Per-call worker timeout
    pub fn worker_timeout(&self) -> Result<Duration, ConfigError> {
        Self::parse_duration(&self.runner.worker_timeout)
    }

    /// Apply per-algorithm overrides to registry defaults.
    ///
    /// Overrides for ids not present in `algorithms` are rejected.
    pub fn apply_to(&self, algorithms: &mut [AlgorithmConfig]) -> Result<(), ConfigError> {
        for (id, overrides) in &self.algorithms {
            let algorithm = algorithms
                .iter_mut()
                .find(|a| &a.id == id)
                .ok_or_else(|| ConfigError::UnknownAlgorithm(id.clone()))?;

            if let Some(enabled) = overrides.enabled {
                algorithm.enabled = enabled;
            }
            if let Some(levels) = &overrides.levels {
                algorithm.levels = levels.clone();
            }
            if let Some(lib_size) = overrides.lib_size_kb {
                algorithm.lib_size_kb = Some(lib_size);
            }
        }
        Ok(())
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# SweepBench Configuration

[runner]
# Iterations per level
iterations = 3
# Isolation mode: "process" or "in-process"
isolation = "process"
# Per-call timeout for the worker process
worker_timeout = "60s"

# Per-algorithm overrides (uncomment to enable)
# [algorithms.zstd]
# enabled = true
# levels = [1, 3, 5, 7]
# lib_size_kb = [48.1, 136.0]

[output]
# Default output format: human, json, csv
format = "human"
# Directory for exported files
directory = "target/sweepbench"
"#
        .to_string()
    }

    /// Parse a duration string (e.g. "3s", "500ms", "2m")
    pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConfigError::InvalidDuration(s.to_string()));
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidDuration(s.to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::InvalidDuration(s.to_string()));
        }

        let seconds = match unit_part.to_lowercase().as_str() {
            "ms" => value / 1_000.0,
            "s" => value,
            "m" | "min" => value * 60.0,
            _ => return Err(ConfigError::InvalidDuration(s.to_string())),
        };

        Ok(Duration::from_secs_f64(seconds))
    }
}

/// Library size metadata keyed by family id
pub fn lib_sizes(algorithms: &[AlgorithmConfig]) -> LibSizes {
    algorithms
        .iter()
        .filter_map(|a| a.lib_size_kb.map(|size| (a.id.clone(), size)))
        .collect()
}
