//! LZ4-compressed module payloads.
//!
//! A compressed payload starts with a 12-byte header:
//! ```text
//! [4 bytes: "XALZ"]
//! [4 bytes: reserved]
//! [4 bytes: uncompressed length (little-endian u32)]
//! [N bytes: LZ4 block]
//! ```

use std::path::Path;

use crate::error::{FormatError, FormatResult};

pub const COMPRESSED_MAGIC: &[u8; 4] = b"XALZ";
pub const COMPRESSED_HEADER_SIZE: usize = 12;
const LENGTH_OFFSET: usize = 8;

/// Upper bound on the LZ4 block expansion ratio. A declared length beyond
/// `payload * MAX_EXPANSION` cannot be produced by a valid block.
const MAX_EXPANSION: usize = 255;

/// Returns `true` if `data` begins with the compression marker.
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= COMPRESSED_MAGIC.len() && &data[..COMPRESSED_MAGIC.len()] == COMPRESSED_MAGIC
}

/// Declared uncompressed length of a marked payload.
pub fn uncompressed_len(data: &[u8]) -> Option<u32> {
    if !is_compressed(data) || data.len() < COMPRESSED_HEADER_SIZE {
        return None;
    }
    let raw: [u8; 4] = data[LENGTH_OFFSET..LENGTH_OFFSET + 4].try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

/// Decompress a marked payload. Returns `Ok(None)` for unmarked data.
pub fn decompress(data: &[u8]) -> FormatResult<Option<Vec<u8>>> {
    if !is_compressed(data) {
        return Ok(None);
    }
    let expected = uncompressed_len(data)
        .ok_or_else(|| FormatError::DecompressionFailed("compressed header truncated".into()))?
        as usize;

    let payload = &data[COMPRESSED_HEADER_SIZE..];
    let limit = payload.len().saturating_mul(MAX_EXPANSION).saturating_add(16);
    if expected > limit {
        return Err(FormatError::DecompressionFailed(format!(
            "declared length {expected} exceeds the {limit} bytes a {}-byte block can hold",
            payload.len()
        )));
    }
    let decompressed = lz4_flex::block::decompress(payload, expected)
        .map_err(|e| FormatError::DecompressionFailed(e.to_string()))?;

    if decompressed.len() != expected {
        return Err(FormatError::DecompressionFailed(format!(
            "size mismatch: expected {expected}, got {}",
            decompressed.len()
        )));
    }
    Ok(Some(decompressed))
}

/// Replace a compressed file with its decompressed contents.
///
/// Returns `true` if the file was rewritten.
pub(crate) fn decompress_file_in_place(path: &Path) -> FormatResult<bool> {
    let data = std::fs::read(path)?;
    match decompress(&data)? {
        Some(decompressed) => {
            std::fs::write(path, decompressed)?;
            tracing::debug!(path = %path.display(), "decompressed extracted payload");
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
pub(crate) fn compress_for_test(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(COMPRESSED_MAGIC);
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&lz4_flex::block::compress(data));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmarked_is_noop() {
        assert!(!is_compressed(b"MZ\x90\x00"));
        assert!(decompress(b"MZ\x90\x00 plain image").unwrap().is_none());
        assert!(decompress(b"XA").unwrap().is_none());
    }

    #[test]
    fn decompress_yields_declared_length() {
        let original = b"module image bytes ".repeat(200);
        let packed = compress_for_test(&original);
        assert!(is_compressed(&packed));
        assert_eq!(uncompressed_len(&packed), Some(original.len() as u32));

        let out = decompress(&packed).unwrap().unwrap();
        assert_eq!(out.len(), original.len());
        assert_eq!(out, original);
    }

    #[test]
    fn truncated_header_fails() {
        let err = decompress(b"XALZ\0\0").unwrap_err();
        assert!(matches!(err, FormatError::DecompressionFailed(_)));
    }

    #[test]
    fn wrong_declared_length_fails() {
        let original = vec![7u8; 1000];
        let mut packed = compress_for_test(&original);
        packed[LENGTH_OFFSET..LENGTH_OFFSET + 4].copy_from_slice(&10u32.to_le_bytes());
        assert!(decompress(&packed).is_err());
    }

    #[test]
    fn implausible_declared_length_rejected_before_allocating() {
        let mut packed = compress_for_test(b"tiny");
        packed[LENGTH_OFFSET..LENGTH_OFFSET + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = decompress(&packed).unwrap_err();
        assert!(matches!(err, FormatError::DecompressionFailed(msg) if msg.contains("declared length")));
    }

    #[test]
    fn highly_repetitive_payload_within_bound() {
        let original = vec![0u8; 64 * 1024];
        let packed = compress_for_test(&original);
        assert_eq!(decompress(&packed).unwrap().unwrap(), original);
    }

    #[test]
    fn file_rewritten_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Foo.dll");
        let original = b"abcabcabcabc".repeat(50);
        std::fs::write(&path, compress_for_test(&original)).unwrap();

        assert!(decompress_file_in_place(&path).unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), original);

        // A second pass sees plain data and leaves it alone.
        assert!(!decompress_file_in_place(&path).unwrap());
    }
}
