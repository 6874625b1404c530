//! SweepBench Codecs
//!
//! Registers the shipped codec and allocator collaborators with the worker
//! registry. Binaries must call [`link`] so the linker keeps this crate and
//! its `inventory` entries.

mod allocation;
mod flate;
mod lz4_block;
mod zstandard;

/// Force this crate to be linked into the final binary
#[inline(never)]
pub fn link() {
    std::hint::black_box(());
}
