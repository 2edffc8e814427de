//! Compression wrappers for remote storage.
//!
//! Objects above the configured size threshold are stored zstd-compressed
//! under `<path><suffix>`; pull decompresses transparently.

use crate::error::{Result, SyncError};

/// Default remote-name suffix for compressed objects.
pub const DEFAULT_SUFFIX: &str = ".zst";

/// Default zstd compression level.
pub const DEFAULT_LEVEL: i32 = 3;

pub fn compress(data: &[u8], level: i32) -> Result<Vec<u8>> {
    Ok(zstd::encode_all(data, level)?)
}

/// Decompress a downloaded object body.
///
/// A malformed stream is an integrity failure, not an IO failure: the
/// object claimed to be compressed but its bytes are not a valid frame.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data).map_err(|e| SyncError::Integrity(format!("zstd decode failed: {e}")))
}
