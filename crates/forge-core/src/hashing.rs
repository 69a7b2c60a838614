// forge-core/src/hashing.rs
// ============================================================================
// Module: Content Hashing
// Description: SHA-256 content hashing for asset bytes and crawl pages.
// Purpose: Give dedup lookups (file_hash) and crawl change detection
//          (content_hash) one shared, deterministic hash representation.
// Dependencies: serde, sha2
// ============================================================================

//! ## Overview
//! Every place the spec compares content by hash (asset dedup in §3, crawl
//! change detection in §4.8) goes through [`hash_bytes`] so the hex
//! representation is consistent across the crate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Content Hash
// ============================================================================

/// Lowercase-hex SHA-256 digest of a content blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hashes raw bytes with SHA-256.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex_encode(&hasher.finalize()))
    }

    /// Returns the digest as a lowercase hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_hash_equal() {
        assert_eq!(ContentHash::of(b"abc"), ContentHash::of(b"abc"));
    }

    #[test]
    fn different_bytes_hash_different() {
        assert_ne!(ContentHash::of(b"abc"), ContentHash::of(b"abd"));
    }

    #[test]
    fn known_vector() {
        // sha256("abc") per NIST test vectors.
        assert_eq!(
            ContentHash::of(b"abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
