//! DEFLATE family via `flate2`

use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use std::io::{Read, Write};
use sweepbench_core::{CodecDef, CodecError, ReferenceDef};

fn level_or_default(level: Option<i32>) -> Result<Compression, CodecError> {
    match level {
        None => Ok(Compression::default()),
        Some(l @ 0..=9) => Ok(Compression::new(l as u32)),
        Some(l) => Err(CodecError::msg(format!("deflate level out of range: {}", l))),
    }
}

fn gzip_compress(data: &[u8], level: Option<i32>) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), level_or_default(level)?);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn gzip_decompress(data: &[u8], _level: Option<i32>) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

fn zlib_compress(data: &[u8], level: Option<i32>) -> Result<Vec<u8>, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level_or_default(level)?);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zlib_decompress(data: &[u8], _level: Option<i32>) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

const STREAM_PRESIZE_CAP: usize = 64 * 1024 * 1024;

// Output guess of 4x the compressed size, capped; larger outputs grow as they arrive
fn stream_presize(compressed_len: usize) -> usize {
    compressed_len.saturating_mul(4).min(STREAM_PRESIZE_CAP)
}

/// Streaming inflate through a buffered reader in 16 KiB chunks
fn zlib_stream_decompress(data: &[u8], _level: Option<i32>) -> Result<Vec<u8>, CodecError> {
    let reader = std::io::BufReader::with_capacity(16 * 1024, data);
    let mut decoder = flate2::bufread::ZlibDecoder::new(reader);
    let mut out = Vec::with_capacity(stream_presize(data.len()));
    let mut chunk = [0u8; 16 * 1024];
    loop {
        let n = decoder.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    Ok(out)
}

inventory::submit! {
    CodecDef {
        id: "gzip",
        name: "gzip (flate2, default level)",
        order: 0,
        levels: &[],
        compress: Some(gzip_compress),
        decompress: gzip_decompress,
        reference: None,
        lib_size_kb: None,
    }
}

inventory::submit! {
    CodecDef {
        id: "deflate",
        name: "zlib (flate2)",
        order: 30,
        levels: &[1, 6, 9],
        compress: Some(zlib_compress),
        decompress: zlib_decompress,
        reference: None,
        lib_size_kb: None,
    }
}

inventory::submit! {
    CodecDef {
        id: "inflate-stream",
        name: "zlib streaming inflate (decode only)",
        order: 40,
        levels: &[],
        compress: None,
        decompress: zlib_stream_decompress,
        reference: Some(ReferenceDef {
            codec: "deflate",
            level: Some(6),
            iteration: 1,
        }),
        lib_size_kb: None,
    }
}
