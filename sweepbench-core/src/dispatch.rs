//! Timed Operation Dispatch
//!
//! Resolves an [`Invocation`] against the registry and times only the codec or
//! allocator call itself. Shared by the worker process and the in-process
//! harness so both measure the same thing.

use crate::measure::{Timer, nanos_to_ms};
use crate::registry::{CodecFn, Registry};
use std::panic::{AssertUnwindSafe, catch_unwind};
use sweepbench_ipc::{CallOutcome, FailureKind, Invocation, Operation, Payload};

/// Why a call produced no outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    /// Error category
    pub kind: FailureKind,
    /// Human-readable error message
    pub message: String,
    /// Backtrace, when captured for a panic
    pub backtrace: Option<String>,
}

impl DispatchFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            backtrace: None,
        }
    }
}

impl std::fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Run one invocation and time it
pub fn dispatch(
    registry: &Registry,
    invocation: Invocation,
) -> Result<CallOutcome, DispatchFailure> {
    let Invocation {
        operation,
        level,
        input,
    } = invocation;

    match &operation {
        Operation::Compress { codec } | Operation::Decompress { codec } => {
            let def = registry.codec(codec).ok_or_else(|| {
                DispatchFailure::new(
                    FailureKind::UnknownTarget,
                    format!("codec not registered: {}", codec),
                )
            })?;

            let codec_fn: CodecFn = if matches!(operation, Operation::Compress { .. }) {
                def.compress.ok_or_else(|| {
                    DispatchFailure::new(
                        FailureKind::Unsupported,
                        format!("{} is decode-only", def.id),
                    )
                })?
            } else {
                def.decompress
            };

            let (elapsed_ms, result) = timed(|| codec_fn(input.as_slice(), level))?;
            let output = result
                .map_err(|e| DispatchFailure::new(FailureKind::Operation, e.to_string()))?;

            Ok(CallOutcome {
                elapsed_ms,
                output: Some(Payload::new(output)),
            })
        }
        Operation::Allocate { allocator } => {
            let def = registry.allocator(allocator).ok_or_else(|| {
                DispatchFailure::new(
                    FailureKind::UnknownTarget,
                    format!("allocator not registered: {}", allocator),
                )
            })?;

            let corpus = String::from_utf8_lossy(input.as_slice()).into_owned();
            let iterations = level.unwrap_or(1).max(0) as usize;

            let (elapsed_ms, live) = timed(|| (def.run)(&corpus, iterations))?;
            tracing::debug!(allocator = def.id, live, "allocation workload finished");

            Ok(CallOutcome {
                elapsed_ms,
                output: None,
            })
        }
    }
}

/// Time a closure, turning a panic into a [`DispatchFailure`]
fn timed<T>(f: impl FnOnce() -> T) -> Result<(f64, T), DispatchFailure> {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let timer = Timer::start();
        let value = f();
        let nanos = timer.stop();
        (nanos_to_ms(nanos), value)
    }));

    result.map_err(|panic| {
        let message = if let Some(s) = panic.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        let backtrace = std::backtrace::Backtrace::capture();
        let backtrace = match backtrace.status() {
            std::backtrace::BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };

        DispatchFailure {
            kind: FailureKind::Panic,
            message,
            backtrace,
        }
    })
}
