#![warn(missing_docs)]
//! SweepBench IPC Protocol
//!
//! Serialization protocol for coordinator-worker communication.
//! Uses rkyv for compact, validated binary frames. Carries timed invocations
//! and their outcomes; binary payloads are move-only on both sides.

mod framing;
mod messages;

pub use framing::{
    FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE, read_frame, read_frame_async,
    write_frame, write_frame_async,
};
pub use messages::{
    CallOutcome, FailureKind, HarnessCommand, Invocation, Operation, Payload, WorkerCapabilities,
    WorkerMessage,
};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Command-line flag that switches the binary into worker mode
pub const WORKER_FLAG: &str = "--sweep-worker";
