//! IPC Message Types
//!
//! All messages are serialized with rkyv and validated on read.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

/// A byte buffer that is moved, never shared, across the harness boundary.
///
/// `Payload` deliberately does not implement `Clone`: handing one to the
/// harness gives up the sender's access to it, and the worker hands a fresh
/// one back. Code that needs to keep the bytes must make an explicit copy
/// with [`Payload::copy_from`].
#[derive(PartialEq, Eq, Default, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct Payload {
    bytes: Vec<u8>,
}

impl Payload {
    /// Take ownership of a buffer
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Explicitly copy bytes into a new payload
    pub fn copy_from(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Number of bytes held
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow the bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Give the underlying buffer back
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Payload({} bytes)", self.bytes.len())
    }
}

/// What the worker should do with an invocation's input
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum Operation {
    /// Encode the input with a codec
    Compress {
        /// Codec identifier (family, without level suffix)
        codec: String,
    },
    /// Decode the input with a codec
    Decompress {
        /// Codec identifier (family, without level suffix)
        codec: String,
    },
    /// Run an allocation workload; the input is the corpus text
    Allocate {
        /// Allocator identifier
        allocator: String,
    },
}

impl Operation {
    /// Registry identifier this operation targets
    pub fn target(&self) -> &str {
        match self {
            Operation::Compress { codec } | Operation::Decompress { codec } => codec,
            Operation::Allocate { allocator } => allocator,
        }
    }

    /// Short verb for logs and error messages
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Compress { .. } => "compress",
            Operation::Decompress { .. } => "decompress",
            Operation::Allocate { .. } => "allocate",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.verb(), self.target())
    }
}

/// A single call into the execution context
#[derive(Debug, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct Invocation {
    /// Operation to perform
    pub operation: Operation,
    /// Parameter level (omitted for parameterless algorithms).
    /// For allocation workloads this is the iteration count.
    pub level: Option<i32>,
    /// Input buffer, transferred to the worker
    pub input: Payload,
}

impl Invocation {
    /// Build an invocation
    pub fn new(operation: Operation, level: Option<i32>, input: Payload) -> Self {
        Self {
            operation,
            level,
            input,
        }
    }
}

/// Result of one timed call
#[derive(Debug, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct CallOutcome {
    /// Wall-clock time of the operation itself, in milliseconds
    pub elapsed_ms: f64,
    /// Output buffer, transferred back to the caller
    pub output: Option<Payload>,
}

/// Worker capabilities advertised during handshake
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerCapabilities {
    /// Protocol version for compatibility
    pub protocol_version: u32,
    /// Number of logical CPUs available
    pub cpu_count: u32,
    /// CPU model string (for reports)
    pub cpu_model: String,
    /// Codec identifiers the worker can serve
    pub codecs: Vec<String>,
    /// Allocator identifiers the worker can serve
    pub allocators: Vec<String>,
}

impl WorkerCapabilities {
    /// Capabilities of this host with the given registry contents
    pub fn detect(codecs: Vec<String>, allocators: Vec<String>) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            cpu_count: num_cpus(),
            cpu_model: cpu_model_string(),
            codecs,
            allocators,
        }
    }
}

/// Messages sent from Worker to Coordinator
#[derive(Debug, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Initial handshake with worker capabilities
    Hello(WorkerCapabilities),

    /// A call finished
    Completed {
        /// Identifier echoed from the command
        call_id: u64,
        /// Timing and output
        outcome: CallOutcome,
    },

    /// A call failed
    Failure {
        /// Identifier echoed from the command
        call_id: u64,
        /// Error category
        kind: FailureKind,
        /// Human-readable error message
        message: String,
        /// Optional backtrace
        backtrace: Option<String>,
    },
}

/// Categories of call failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum FailureKind {
    /// Rust panic (caught)
    Panic,
    /// No codec or allocator registered under the requested id
    UnknownTarget,
    /// The target does not support the requested operation
    Unsupported,
    /// The algorithm returned an error
    Operation,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Panic => "panic",
            FailureKind::UnknownTarget => "unknown target",
            FailureKind::Unsupported => "unsupported",
            FailureKind::Operation => "operation error",
        };
        f.write_str(name)
    }
}

/// Commands sent from Coordinator to Worker
#[derive(Debug, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum HarnessCommand {
    /// Run one timed operation
    Invoke {
        /// Correlation id, echoed in the reply
        call_id: u64,
        /// What to run
        invocation: Invocation,
    },

    /// Request graceful shutdown
    Shutdown,
}

// Helper functions

fn num_cpus() -> u32 {
    std::thread::available_parallelism()
        .map(|p| p.get() as u32)
        .unwrap_or(1)
}

fn cpu_model_string() -> String {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|line| line.starts_with("model name"))
                    .and_then(|line| line.split(':').nth(1))
                    .map(|s| s.trim().to_string())
            })
            .unwrap_or_else(|| "Unknown CPU".to_string())
    }

    #[cfg(not(target_os = "linux"))]
    {
        "Unknown CPU".to_string()
    }
}
