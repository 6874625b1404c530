//! Sweep Planner
//!
//! Expands the enabled algorithm configuration into the exact, ordered list
//! of timed operations a sweep will run.
//!
//! For every enabled algorithm in configuration order, every level, and every
//! iteration `1..=N`, a compress task is followed by a decompress task that
//! consumes its output. Decode-only algorithms instead decompress a reference
//! payload captured from one designated compress task; if that task is not in
//! the plan, the algorithm is skipped.

use regex::Regex;
use std::collections::HashMap;
use sweepbench_core::{CodecDef, Registry};
use sweepbench_ipc::Operation;

/// Compress task whose output decode-only algorithms consume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpec {
    /// Encoder family id
    pub codec: String,
    /// Encoder level (`None` for parameterless encoders)
    pub level: Option<i32>,
    /// 1-based iteration
    pub iteration: u32,
}

/// What an algorithm can be asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// Compress, then decompress its own output
    RoundTrip,
    /// Only decompress the designated reference payload
    DecodeOnly {
        /// Where the input comes from
        reference: ReferenceSpec,
    },
}

/// One algorithm's sweep settings
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmConfig {
    /// Family id as registered
    pub id: String,
    /// Included in the sweep
    pub enabled: bool,
    /// Levels to sweep; empty means one parameterless run
    pub levels: Vec<i32>,
    /// Round-trip or decode-only
    pub capability: Capability,
    /// Library size metadata (read, write) in gzip kB
    pub lib_size_kb: Option<[f64; 2]>,
}

impl AlgorithmConfig {
    /// Default settings for a registered codec
    pub fn from_def(def: &CodecDef) -> Self {
        let capability = match (def.compress, def.reference) {
            (None, Some(reference)) => Capability::DecodeOnly {
                reference: ReferenceSpec {
                    codec: reference.codec.to_string(),
                    level: reference.level,
                    iteration: reference.iteration,
                },
            },
            _ => Capability::RoundTrip,
        };

        Self {
            id: def.id.to_string(),
            // A decode-only codec without a reference can never run
            enabled: def.compress.is_some() || def.reference.is_some(),
            levels: def.levels.to_vec(),
            capability,
            lib_size_kb: def.lib_size_kb,
        }
    }

    /// Level list as the planner iterates it
    fn level_slots(&self) -> Vec<Option<i32>> {
        if self.levels.is_empty() {
            vec![None]
        } else {
            self.levels.iter().copied().map(Some).collect()
        }
    }
}

/// Default configuration for every codec in the registry, in registry order
pub fn default_algorithms(registry: &Registry) -> Vec<AlgorithmConfig> {
    registry
        .codecs()
        .iter()
        .map(|def| AlgorithmConfig::from_def(def))
        .collect()
}

/// Disable every algorithm whose id does not match `filter`
pub fn apply_filter(algorithms: &mut [AlgorithmConfig], filter: &Regex) {
    for algorithm in algorithms.iter_mut() {
        if !filter.is_match(&algorithm.id) {
            algorithm.enabled = false;
        }
    }
}

/// Operation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Encode
    Compress,
    /// Decode
    Decompress,
}

/// Where a task's input buffer comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceBinding {
    /// The user's input bytes
    Input,
    /// Output of the compress task immediately before this one
    PrecedingCompress,
    /// Output of the compress task at plan index `producer`
    Reference {
        /// Plan index of the capturing compress task
        producer: usize,
    },
}

/// One timed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkTask {
    /// Family id
    pub algorithm: String,
    /// Level, if the algorithm is parameterised
    pub level: Option<i32>,
    /// Compress or decompress
    pub direction: Direction,
    /// 1-based iteration
    pub iteration: u32,
    /// Input source
    pub source: SourceBinding,
    /// Output must be kept as a reference payload
    pub captures_reference: bool,
}

impl BenchmarkTask {
    /// Id recorded on samples: `zstd-3`, or just `lz4`
    pub fn sample_id(&self) -> String {
        match self.level {
            Some(level) => format!("{}-{}", self.algorithm, level),
            None => self.algorithm.clone(),
        }
    }

    /// Progress label, e.g. `zstd-3: (2/3)`
    pub fn status_label(&self, iterations: u32) -> String {
        format!("{}: ({}/{})", self.sample_id(), self.iteration, iterations)
    }

    /// Worker operation for this task
    pub fn operation(&self) -> Operation {
        let codec = self.algorithm.clone();
        match self.direction {
            Direction::Compress => Operation::Compress { codec },
            Direction::Decompress => Operation::Decompress { codec },
        }
    }
}

/// Ordered tasks for one sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPlan {
    /// Tasks in execution order
    pub tasks: Vec<BenchmarkTask>,
    /// Iterations per level
    pub iterations: u32,
    /// Enabled decode-only algorithms left out because their reference was not planned
    pub skipped: Vec<String>,
}

impl SweepPlan {
    /// Task counts per sample id, in plan order
    pub fn summary(&self) -> PlanSummary {
        let mut per_algorithm: Vec<(String, usize)> = Vec::new();
        for task in &self.tasks {
            let id = task.sample_id();
            match per_algorithm.last_mut() {
                Some((last, count)) if *last == id => *count += 1,
                _ => per_algorithm.push((id, 1)),
            }
        }

        PlanSummary {
            total_tasks: self.tasks.len(),
            iterations: self.iterations,
            per_algorithm,
            skipped: self.skipped.clone(),
        }
    }
}

/// Dry-run view of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    /// Number of timed operations
    pub total_tasks: usize,
    /// Iterations per level
    pub iterations: u32,
    /// Tasks per sample id
    pub per_algorithm: Vec<(String, usize)>,
    /// Skipped decode-only algorithms
    pub skipped: Vec<String>,
}

/// Build the sweep plan
pub fn build_plan(algorithms: &[AlgorithmConfig], iterations: u32) -> SweepPlan {
    let mut tasks: Vec<BenchmarkTask> = Vec::new();
    let mut skipped = Vec::new();
    // (family, level, iteration) -> plan index of the compress task
    let mut compress_index: HashMap<(String, Option<i32>, u32), usize> = HashMap::new();

    for algorithm in algorithms.iter().filter(|a| a.enabled) {
        match &algorithm.capability {
            Capability::RoundTrip => {
                for level in algorithm.level_slots() {
                    for iteration in 1..=iterations {
                        compress_index
                            .insert((algorithm.id.clone(), level, iteration), tasks.len());
                        tasks.push(BenchmarkTask {
                            algorithm: algorithm.id.clone(),
                            level,
                            direction: Direction::Compress,
                            iteration,
                            source: SourceBinding::Input,
                            captures_reference: false,
                        });
                        tasks.push(BenchmarkTask {
                            algorithm: algorithm.id.clone(),
                            level,
                            direction: Direction::Decompress,
                            iteration,
                            source: SourceBinding::PrecedingCompress,
                            captures_reference: false,
                        });
                    }
                }
            }
            Capability::DecodeOnly { reference } => {
                let key = (reference.codec.clone(), reference.level, reference.iteration);
                let Some(&producer) = compress_index.get(&key) else {
                    tracing::debug!(
                        "skipping {}: reference {} level {:?} iteration {} not planned",
                        algorithm.id,
                        reference.codec,
                        reference.level,
                        reference.iteration
                    );
                    skipped.push(algorithm.id.clone());
                    continue;
                };

                tasks[producer].captures_reference = true;
                for level in algorithm.level_slots() {
                    for iteration in 1..=iterations {
                        tasks.push(BenchmarkTask {
                            algorithm: algorithm.id.clone(),
                            level,
                            direction: Direction::Decompress,
                            iteration,
                            source: SourceBinding::Reference { producer },
                            captures_reference: false,
                        });
                    }
                }
            }
        }
    }

    SweepPlan {
        tasks,
        iterations,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(id: &str, levels: &[i32]) -> AlgorithmConfig {
        AlgorithmConfig {
            id: id.to_string(),
            enabled: true,
            levels: levels.to_vec(),
            capability: Capability::RoundTrip,
            lib_size_kb: None,
        }
    }

    fn decode_only(id: &str, codec: &str, level: Option<i32>, iteration: u32) -> AlgorithmConfig {
        AlgorithmConfig {
            id: id.to_string(),
            enabled: true,
            levels: Vec::new(),
            capability: Capability::DecodeOnly {
                reference: ReferenceSpec {
                    codec: codec.to_string(),
                    level,
                    iteration,
                },
            },
            lib_size_kb: None,
        }
    }

    #[test]
    fn test_round_trip_order() {
        let plan = build_plan(&[round_trip("lz4", &[]), round_trip("zstd", &[1, 3])], 2);

        // lz4: 2 iterations x 2 tasks, zstd: 2 levels x 2 iterations x 2 tasks
        assert_eq!(plan.tasks.len(), 4 + 8);

        let labels: Vec<_> = plan
            .tasks
            .iter()
            .map(|t| (t.sample_id(), t.direction, t.iteration))
            .collect();
        assert_eq!(labels[0], ("lz4".to_string(), Direction::Compress, 1));
        assert_eq!(labels[1], ("lz4".to_string(), Direction::Decompress, 1));
        assert_eq!(labels[2], ("lz4".to_string(), Direction::Compress, 2));
        assert_eq!(labels[4], ("zstd-1".to_string(), Direction::Compress, 1));
        assert_eq!(labels[8], ("zstd-3".to_string(), Direction::Compress, 1));

        for pair in plan.tasks.chunks(2) {
            assert_eq!(pair[0].source, SourceBinding::Input);
            assert_eq!(pair[1].source, SourceBinding::PrecedingCompress);
        }
    }

    #[test]
    fn test_disabled_algorithms_are_not_planned() {
        let mut lz4 = round_trip("lz4", &[]);
        lz4.enabled = false;
        let plan = build_plan(&[lz4, round_trip("zstd", &[1])], 3);
        assert!(plan.tasks.iter().all(|t| t.algorithm == "zstd"));
        assert_eq!(plan.tasks.len(), 6);
    }

    #[test]
    fn test_decode_only_bound_to_reference() {
        let plan = build_plan(
            &[
                round_trip("deflate", &[1, 6, 9]),
                decode_only("inflate-stream", "deflate", Some(6), 1),
            ],
            3,
        );

        // deflate-6 iteration 1 compress is the 7th task
        let producer = 6;
        assert_eq!(plan.tasks[producer].sample_id(), "deflate-6");
        assert_eq!(plan.tasks[producer].iteration, 1);
        assert!(plan.tasks[producer].captures_reference);
        assert_eq!(plan.tasks.iter().filter(|t| t.captures_reference).count(), 1);

        let decode: Vec<_> = plan
            .tasks
            .iter()
            .filter(|t| t.algorithm == "inflate-stream")
            .collect();
        assert_eq!(decode.len(), 3);
        assert!(decode.iter().all(|t| t.direction == Direction::Decompress
            && t.source == SourceBinding::Reference { producer }));
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_decode_only_skipped_without_reference() {
        let mut deflate = round_trip("deflate", &[1, 6, 9]);
        deflate.enabled = false;
        let plan = build_plan(
            &[deflate, decode_only("inflate-stream", "deflate", Some(6), 1)],
            3,
        );
        assert!(plan.tasks.is_empty());
        assert_eq!(plan.skipped, vec!["inflate-stream".to_string()]);

        // Level not swept
        let plan = build_plan(
            &[
                round_trip("deflate", &[1, 9]),
                decode_only("inflate-stream", "deflate", Some(6), 1),
            ],
            3,
        );
        assert!(plan.tasks.iter().all(|t| t.algorithm == "deflate"));

        // Too few iterations
        let plan = build_plan(
            &[
                round_trip("deflate", &[6]),
                decode_only("inflate-stream", "deflate", Some(6), 2),
            ],
            1,
        );
        assert_eq!(plan.skipped, vec!["inflate-stream".to_string()]);
    }

    #[test]
    fn test_decode_only_before_encoder_is_skipped() {
        let plan = build_plan(
            &[
                decode_only("inflate-stream", "deflate", Some(6), 1),
                round_trip("deflate", &[6]),
            ],
            1,
        );
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.skipped, vec!["inflate-stream".to_string()]);
    }

    #[test]
    fn test_zero_iterations_plans_nothing() {
        let plan = build_plan(&[round_trip("lz4", &[])], 0);
        assert!(plan.tasks.is_empty());
    }

    #[test]
    fn test_status_label_and_summary() {
        let plan = build_plan(&[round_trip("zstd", &[3])], 3);
        assert_eq!(plan.tasks[2].status_label(3), "zstd-3: (2/3)");

        let summary = plan.summary();
        assert_eq!(summary.total_tasks, 6);
        assert_eq!(summary.per_algorithm, vec![("zstd-3".to_string(), 6)]);
    }

    #[test]
    fn test_filter() {
        let mut algorithms = vec![round_trip("lz4", &[]), round_trip("zstd", &[1])];
        apply_filter(&mut algorithms, &Regex::new("^zs").unwrap());
        assert!(!algorithms[0].enabled);
        assert!(algorithms[1].enabled);
    }
}
