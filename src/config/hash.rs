//! Payload fingerprints for change detection.
//!
//! Auth material is write-only on the remote side, so the engine keeps a
//! SHA-256 fingerprint of the last blob it sent and compares fingerprints to
//! decide whether an auth update is needed. The blob itself is never stored.

use sha2::{Digest, Sha256};

use crate::state::{AuthBlob, ResourceKind};

/// Hasher for computing payload fingerprints.
#[derive(Debug, Default, Clone, Copy)]
pub struct PayloadHasher;

impl PayloadHasher {
    /// Creates a new payload hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Fingerprints an auth blob for one resource kind.
    #[must_use]
    pub fn fingerprint_auth(&self, kind: ResourceKind, blob: &AuthBlob) -> String {
        let mut hasher = Sha256::new();

        // Kind prefix keeps identical tokens on different kinds apart
        hasher.update(kind.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(blob.expose().as_bytes());

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two fingerprints in constant time.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blob(token: &str) -> AuthBlob {
        AuthBlob::from_json(&json!({ "token": token })).unwrap()
    }

    #[test]
    fn test_auth_fingerprint_deterministic() {
        let hasher = PayloadHasher::new();

        let hash1 = hasher.fingerprint_auth(ResourceKind::ScanSource, &blob("t1"));
        let hash2 = hasher.fingerprint_auth(ResourceKind::ScanSource, &blob("t1"));

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
        assert!(!hash1.contains("t1"));
    }

    #[test]
    fn test_auth_fingerprint_differs() {
        let hasher = PayloadHasher::new();

        let token_change = hasher.fingerprint_auth(ResourceKind::ScanSource, &blob("t2"));
        let kind_change = hasher.fingerprint_auth(ResourceKind::SecretManager, &blob("t1"));
        let original = hasher.fingerprint_auth(ResourceKind::ScanSource, &blob("t1"));

        assert_ne!(original, token_change);
        assert_ne!(original, kind_change);
    }

    #[test]
    fn test_short_hash() {
        let hasher = PayloadHasher::new();
        let short = hasher.short_hash("abcdef1234567890abcdef1234567890");

        assert_eq!(short, "abcdef12");
    }

    #[test]
    fn test_hashes_match() {
        assert!(PayloadHasher::hashes_match("abc123", "abc123"));
        assert!(!PayloadHasher::hashes_match("abc123", "abc124"));
        assert!(!PayloadHasher::hashes_match("abc123", "abc12"));
    }
}
