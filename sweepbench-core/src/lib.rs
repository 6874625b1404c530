#![warn(missing_docs)]
//! SweepBench Core - Worker Runtime
//!
//! This crate provides the execution side of a sweep:
//! - `CodecDef` / `AllocatorDef` registration via `inventory`
//! - Timed dispatch of a single invocation, with panic capture
//! - The worker main loop serving harness commands over stdio
//! - CPU affinity pinning for steadier timings

mod dispatch;
mod measure;
mod registry;
mod worker;

pub use dispatch::{DispatchFailure, dispatch};
pub use measure::{Timer, nanos_to_ms, pin_to_cpu};
pub use registry::{
    AllocationFn, AllocatorDef, CodecDef, CodecError, CodecFn, ReferenceDef, Registry,
};
pub use worker::{WorkerMain, shutdown_requested};

/// Re-exported so codec crates can register without depending on `inventory` directly
pub use inventory;

/// Anchor to prevent LTO from stripping inventory entries
#[used]
#[doc(hidden)]
pub static REGISTRY_ANCHOR: fn() = || {
    for _ in inventory::iter::<CodecDef> {}
    for _ in inventory::iter::<AllocatorDef> {}
};
