//! Allocation Benchmark
//!
//! One timed `Allocate` call per run, each in a freshly acquired context.

use crate::harness::{HarnessError, HarnessFactory};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use sweepbench_ipc::{Invocation, Operation, Payload};

/// One finished allocation run
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationResult {
    /// Allocator id
    pub allocator: String,
    /// Workload iterations
    pub iterations: u32,
    /// Wall-clock milliseconds of the workload
    pub elapsed_ms: f64,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

/// Run one allocation workload.
///
/// The context is released whether or not the call succeeded.
pub async fn run_allocation(
    factory: &dyn HarnessFactory,
    allocator: &str,
    corpus: &str,
    iterations: u32,
) -> Result<AllocationResult, HarnessError> {
    let mut harness = factory.acquire().await?;

    let level = i32::try_from(iterations).unwrap_or(i32::MAX);
    let outcome = harness
        .call(Invocation::new(
            Operation::Allocate {
                allocator: allocator.to_string(),
            },
            Some(level),
            Payload::copy_from(corpus.as_bytes()),
        ))
        .await;

    if let Err(e) = harness.release().await {
        tracing::warn!("failed to release execution context: {}", e);
    }

    let outcome = outcome?;
    tracing::debug!(allocator, iterations, elapsed_ms = outcome.elapsed_ms, "allocation run");

    Ok(AllocationResult {
        allocator: allocator.to_string(),
        iterations,
        elapsed_ms: outcome.elapsed_ms,
        finished_at: Utc::now(),
    })
}

/// Allocation results, newest first
#[derive(Debug, Clone, Default)]
pub struct AllocationLog {
    entries: VecDeque<AllocationResult>,
}

impl AllocationLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result at the front
    pub fn push(&mut self, result: AllocationResult) {
        self.entries.push_front(result);
    }

    /// Results, newest first
    pub fn iter(&self) -> impl Iterator<Item = &AllocationResult> {
        self.entries.iter()
    }

    /// Number of results
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
