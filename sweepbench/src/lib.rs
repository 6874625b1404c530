#![warn(missing_docs)]
//! # SweepBench
//!
//! Benchmark interchangeable compression codecs and allocation workloads
//! against your own input.
//!
//! - **Process Isolation**: timed operations run in a dedicated worker process
//!   that is torn down on every exit path
//! - **Zero-Copy IPC**: harness and worker exchange rkyv frames with move-only payloads
//! - **Deterministic Sweeps**: every enabled codec, every level, N iterations,
//!   compress then decompress, in one fixed order
//! - **Decode-Only Codecs**: bound to a reference payload produced earlier in the same sweep
//! - **Exports**: JSON and CSV, plus aggregated table rows and per-family chart data
//!
//! ## Quick Start
//!
//! ```ignore
//! use sweepbench::prelude::*;
//!
//! let factory = Arc::new(InProcessHarnessFactory::new(Registry::discover()));
//! let runner = SweepRunner::new(factory, 3);
//! let result = runner.run(&input, &default_algorithms(&Registry::discover())).await?;
//! println!("{}", export_csv(result.data.total_bytes, &result.data.samples)?);
//! ```
//!
//! ## Registering a Codec
//!
//! ```ignore
//! sweepbench::core::inventory::submit! {
//!     CodecDef {
//!         id: "mine",
//!         name: "My codec",
//!         order: 100,
//!         levels: &[],
//!         compress: Some(my_compress),
//!         decompress: my_decompress,
//!         reference: None,
//!         lib_size_kb: None,
//!     }
//! }
//! ```

pub use sweepbench_cli as cli;
pub use sweepbench_codecs as codecs;
pub use sweepbench_core as core;
pub use sweepbench_ipc as ipc;
pub use sweepbench_report as report;

pub use sweepbench_cli::{run, run_with_cli};

/// Prelude for common imports
pub mod prelude {
    pub use std::sync::Arc;
    pub use sweepbench_cli::{
        AlgorithmConfig, CancellationFlag, HarnessFactory, InProcessHarnessFactory,
        ProcessHarnessFactory, SweepConfig, SweepInput, SweepResult, SweepRunner, SweepState,
        Termination, build_plan, default_algorithms,
    };
    pub use sweepbench_core::{AllocatorDef, CodecDef, CodecError, Registry};
    pub use sweepbench_report::{
        ChartView, RawSample, SelectionStore, TableView, chart_datasets, export_csv,
        export_json, rows,
    };
}
