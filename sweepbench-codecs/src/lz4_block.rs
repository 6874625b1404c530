//! LZ4 block format via the `lz4` crate

use sweepbench_core::{CodecDef, CodecError};

// Size-prefixed blocks so decompress needs no side channel
fn compress(data: &[u8], _level: Option<i32>) -> Result<Vec<u8>, CodecError> {
    Ok(lz4::block::compress(data, None, true)?)
}

fn decompress(data: &[u8], _level: Option<i32>) -> Result<Vec<u8>, CodecError> {
    Ok(lz4::block::decompress(data, None)?)
}

inventory::submit! {
    CodecDef {
        id: "lz4",
        name: "LZ4 block",
        order: 10,
        levels: &[],
        compress: Some(compress),
        decompress,
        reference: None,
        lib_size_kb: None,
    }
}
