//! Codec and Allocator Registry
//!
//! Algorithm collaborators register themselves with `inventory::submit!`.
//! The worker resolves every invocation against a [`Registry`]; the coordinator
//! uses the same registry to build the default algorithm configuration.

use thiserror::Error;

/// Error returned by a codec collaborator
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Message(String),
}

impl CodecError {
    /// Build an error from a message
    pub fn msg(message: impl Into<String>) -> Self {
        CodecError::Message(message.into())
    }
}

/// Encoder/decoder entry point: input bytes and optional level in, output bytes out
pub type CodecFn = fn(&[u8], Option<i32>) -> Result<Vec<u8>, CodecError>;

/// Allocation workload: corpus text and iteration count in, live object count out
pub type AllocationFn = fn(&str, usize) -> usize;

/// Designated reference payload for decode-only codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceDef {
    /// Codec whose compress output is captured
    pub codec: &'static str,
    /// Level of the capturing run (`None` for parameterless codecs)
    pub level: Option<i32>,
    /// 1-based iteration of the capturing run
    pub iteration: u32,
}

/// Codec registered via `inventory::submit!`
#[derive(Debug, Clone)]
pub struct CodecDef {
    /// Family identifier, e.g. `zstd`
    pub id: &'static str,
    /// Human-readable name
    pub name: &'static str,
    /// Position in the default sweep order (lower runs first)
    pub order: u32,
    /// Parameter levels swept by default; empty for parameterless codecs
    pub levels: &'static [i32],
    /// Encoder, `None` for decode-only codecs
    pub compress: Option<CodecFn>,
    /// Decoder
    pub decompress: CodecFn,
    /// Reference payload source, required for decode-only codecs
    pub reference: Option<ReferenceDef>,
    /// Library size metadata (read, write) in gzip kB
    pub lib_size_kb: Option<[f64; 2]>,
}

impl CodecDef {
    /// Whether the codec can only decode a reference payload
    pub fn is_decode_only(&self) -> bool {
        self.compress.is_none()
    }
}

/// Allocator workload registered via `inventory::submit!`
#[derive(Debug, Clone)]
pub struct AllocatorDef {
    /// Allocator identifier
    pub id: &'static str,
    /// Human-readable name
    pub name: &'static str,
    /// Display order
    pub order: u32,
    /// Workload entry point
    pub run: AllocationFn,
}

inventory::collect!(CodecDef);
inventory::collect!(AllocatorDef);

/// Snapshot of the registered collaborators, in deterministic order
#[derive(Debug, Clone, Default)]
pub struct Registry {
    codecs: Vec<&'static CodecDef>,
    allocators: Vec<&'static AllocatorDef>,
}

impl Registry {
    /// Collect everything registered in this binary
    pub fn discover() -> Self {
        Self::from_defs(
            inventory::iter::<CodecDef>.into_iter().collect(),
            inventory::iter::<AllocatorDef>.into_iter().collect(),
        )
    }

    /// Build a registry from explicit definitions
    pub fn from_defs(
        mut codecs: Vec<&'static CodecDef>,
        mut allocators: Vec<&'static AllocatorDef>,
    ) -> Self {
        // inventory iteration order is unspecified
        codecs.sort_by_key(|c| (c.order, c.id));
        allocators.sort_by_key(|a| (a.order, a.id));
        Self { codecs, allocators }
    }

    /// Registered codecs in sweep order
    pub fn codecs(&self) -> &[&'static CodecDef] {
        &self.codecs
    }

    /// Registered allocators in display order
    pub fn allocators(&self) -> &[&'static AllocatorDef] {
        &self.allocators
    }

    /// Look up a codec by family id
    pub fn codec(&self, id: &str) -> Option<&'static CodecDef> {
        self.codecs.iter().copied().find(|c| c.id == id)
    }

    /// Look up an allocator by id
    pub fn allocator(&self, id: &str) -> Option<&'static AllocatorDef> {
        self.allocators.iter().copied().find(|a| a.id == id)
    }

    /// Codec ids, for the worker handshake
    pub fn codec_ids(&self) -> Vec<String> {
        self.codecs.iter().map(|c| c.id.to_string()).collect()
    }

    /// Allocator ids, for the worker handshake
    pub fn allocator_ids(&self) -> Vec<String> {
        self.allocators.iter().map(|a| a.id.to_string()).collect()
    }
}
