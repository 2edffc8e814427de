//! Content-addressed hashing using BLAKE3.
//!
//! Hashes are always computed over uncompressed bytes, so identical content
//! produces the same digest whether it is stored raw or compressed.

use std::fmt;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A 256-bit BLAKE3 content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash arbitrary bytes. Pure; no side effects.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash a byte stream with a 64KB buffer.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut hasher = blake3::Hasher::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(*hasher.finalize().as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex digest, as stored in the ancestor manifest.
    pub fn from_hex(s: &str) -> Option<Self> {
        let raw = hex::decode(s).ok()?;
        let bytes: [u8; 32] = raw.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "ContentHash({})", hex.get(..16).unwrap_or(&hex))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "{}", hex.get(..16).unwrap_or(&hex))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let h1 = ContentHash::from_bytes(b"hello world");
        let h2 = ContentHash::from_bytes(b"hello world");
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_hash_distinguishes_content() {
        let h1 = ContentHash::from_bytes(b"hello");
        let h2 = ContentHash::from_bytes(b"world");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_reader_matches_bytes() {
        let data = vec![0xA5u8; 200_000]; // spans multiple buffer fills
        let from_bytes = ContentHash::from_bytes(&data);
        let from_reader = ContentHash::from_reader(&data[..]).unwrap();
        assert_eq!(from_bytes, from_reader);
    }

    #[test]
    fn test_hex_roundtrip() {
        let h = ContentHash::from_bytes(b"roundtrip");
        let parsed = ContentHash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(ContentHash::from_hex("not hex").is_none());
        assert!(ContentHash::from_hex("abcd").is_none()); // too short
    }
}
