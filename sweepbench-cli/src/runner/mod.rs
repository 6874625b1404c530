//! Sweep Runner
//!
//! Drives a planned sweep through an execution harness and reports the
//! result.
//!
//! ## Pipeline Overview
//!
//! ```text
//! AlgorithmConfig (registry defaults + sweep.toml + flags)
//!       │
//!       ▼
//! ┌─────────────┐
//! │   planner   │  Ordered compress/decompress tasks
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │  execution  │  Dispatch tasks, publish state snapshots
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │   machine   │  Idle -> Running -> Finished
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ formatting  │  Human-readable output
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`execution`] - Sweep driver with cooperative cancellation
//! - [`machine`] - Sweep state machine
//! - [`allocation`] - Single-call allocation benchmark
//! - [`formatting`] - Human-readable output formatting

mod allocation;
mod execution;
mod formatting;
mod machine;

pub use allocation::{AllocationLog, AllocationResult, run_allocation};
pub use execution::{CancellationFlag, SweepInput, SweepResult, SweepRunner};
pub use formatting::{format_allocation_log, format_human_output, format_plan, format_registry};
pub use machine::{SweepAction, SweepData, SweepError, SweepState, Termination};
