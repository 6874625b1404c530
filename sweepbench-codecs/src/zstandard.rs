//! Zstandard via the `zstd` crate

use sweepbench_core::{CodecDef, CodecError};

fn compress(data: &[u8], level: Option<i32>) -> Result<Vec<u8>, CodecError> {
    let level = level.unwrap_or(zstd::DEFAULT_COMPRESSION_LEVEL);
    if !zstd::compression_level_range().contains(&level) {
        return Err(CodecError::msg(format!("zstd level out of range: {}", level)));
    }
    Ok(zstd::bulk::compress(data, level)?)
}

fn decompress(data: &[u8], _level: Option<i32>) -> Result<Vec<u8>, CodecError> {
    Ok(zstd::stream::decode_all(data)?)
}

inventory::submit! {
    CodecDef {
        id: "zstd",
        name: "Zstandard",
        order: 20,
        levels: &[1, 3, 5, 7],
        compress: Some(compress),
        decompress,
        reference: None,
        lib_size_kb: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_roundtrip() {
        let text = "sweep ".repeat(512);
        for level in [1, 3, 5, 7] {
            let compressed = compress(text.as_bytes(), Some(level)).unwrap();
            assert!(compressed.len() < text.len());
            assert_eq!(decompress(&compressed, None).unwrap(), text.as_bytes());
        }
    }

    #[test]
    fn test_invalid_level() {
        assert!(compress(b"x", Some(1000)).is_err());
    }
}
