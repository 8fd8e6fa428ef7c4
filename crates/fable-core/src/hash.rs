//! Content hashing for URL signatures and record file names

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 content hash.
///
/// Presigned URLs carry a hash as their signature; record stores use one
/// to turn free-text owner names into file names.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute a hash from bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Compute a hash over several byte slices, in order
    pub fn from_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    /// Get the hash as a hex string
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistent_hashing() {
        let h1 = ContentHash::from_bytes(b"hello");
        let h2 = ContentHash::from_bytes(b"hello");
        assert_eq!(h1, h2);
        assert_ne!(h1, ContentHash::from_bytes(b"world"));
    }

    #[test]
    fn test_parts_match_concatenation() {
        let joined = ContentHash::from_bytes(b"story-images/x.png|42");
        let parts = ContentHash::from_parts(&[&b"story-images/x.png"[..], b"|", b"42"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn test_hex_form() {
        let h = ContentHash::from_bytes(b"hello");
        assert_eq!(h.to_hex().len(), 64);
        assert!(h.to_hex().starts_with(&h.to_string()));
    }
}
