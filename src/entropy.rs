//! Entropy coding pass (spec §6): wraps/unwraps a section's bytes in a
//! zstd frame. Each container section is compressed independently so the
//! reader can decode exactly the sections a query touches (spec §4.7).

use std::io::{Read, Write};

use crate::error::ContainerError;

/// Default zstd level (spec §9 design notes): high enough to exploit the
/// columnar layout's redundancy without the cost of the max level.
pub const DEFAULT_LEVEL: i32 = 15;

pub fn compress(bytes: &[u8], level: i32) -> Result<Vec<u8>, ContainerError> {
    zstd::stream::encode_all(bytes, level).map_err(|e| ContainerError::EntropyDecodeFailed {
        message: e.to_string(),
    })
}

pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, ContainerError> {
    zstd::stream::decode_all(bytes).map_err(|e| ContainerError::EntropyDecodeFailed {
        message: e.to_string(),
    })
}

/// Train a small zstd dictionary on the first `config.dict_train_bytes`
/// worth of column payloads (spec §4.5). `samples` are independent byte
/// strings (one per column block, see `container::write`); training fails
/// gracefully — returning `None` rather than an error — when zstd judges
/// the sample set too small or too uniform to produce a useful dictionary,
/// per spec's "if training fails the pass runs without a dictionary".
pub fn train_dictionary(samples: &[Vec<u8>], max_size: usize) -> Option<Vec<u8>> {
    if samples.is_empty() || max_size == 0 {
        return None;
    }
    let sizes: Vec<usize> = samples.iter().map(Vec::len).collect();
    let concatenated: Vec<u8> = samples.concat();
    zstd::dict::from_continuous(&concatenated, &sizes, max_size).ok()
}

pub fn compress_with_dict(bytes: &[u8], level: i32, dict: Option<&[u8]>) -> Result<Vec<u8>, ContainerError> {
    let Some(dict) = dict else {
        return compress(bytes, level);
    };
    let map_err = |e: std::io::Error| ContainerError::EntropyDecodeFailed { message: e.to_string() };
    let mut encoder = zstd::stream::Encoder::with_dictionary(Vec::new(), level, dict).map_err(map_err)?;
    encoder.write_all(bytes).map_err(map_err)?;
    encoder.finish().map_err(map_err)
}

pub fn decompress_with_dict(bytes: &[u8], dict: Option<&[u8]>) -> Result<Vec<u8>, ContainerError> {
    let Some(dict) = dict else {
        return decompress(bytes);
    };
    let map_err = |e: std::io::Error| ContainerError::EntropyDecodeFailed { message: e.to_string() };
    let mut decoder = zstd::stream::Decoder::with_dictionary(bytes, dict).map_err(map_err)?;
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(map_err)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let compressed = compress(&data, DEFAULT_LEVEL).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
        assert!(compressed.len() < data.len());
    }

    #[test]
    fn test_no_samples_skips_training() {
        assert!(train_dictionary(&[], 1024).is_none());
    }

    #[test]
    fn test_dictionary_roundtrip_when_training_succeeds() {
        let samples: Vec<Vec<u8>> = (0..200)
            .map(|i| format!("host=web-{:03} path=/api/v1/widgets status=200", i % 8).into_bytes())
            .collect();
        let Some(dict) = train_dictionary(&samples, 4096) else {
            // zstd declined to train on this input; nothing further to assert.
            return;
        };
        let payload = b"host=web-002 path=/api/v1/widgets status=200";
        let compressed = compress_with_dict(payload, DEFAULT_LEVEL, Some(&dict)).unwrap();
        let decompressed = decompress_with_dict(&compressed, Some(&dict)).unwrap();
        assert_eq!(decompressed, payload);
    }
}
