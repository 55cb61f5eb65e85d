//! Request fingerprints.
//!
//! A fingerprint is the SHA-256 digest of the normalized request key.
//! Normalization is case folding plus whitespace trimming, so
//! `"  The Sky Is Blue  "` and `"the sky is blue"` share a fingerprint.

use std::fmt;

use sha2::{Digest, Sha256};

/// Normalize a raw request key: trim surrounding whitespace, then case-fold.
pub fn normalize(raw_key: &str) -> String {
    raw_key.trim().to_lowercase()
}

/// Deterministic, collision-resistant cache key for a raw request key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint a raw request key (normalizes first).
    pub fn of(raw_key: &str) -> Self {
        let digest: [u8; 32] = Sha256::digest(normalize(raw_key).as_bytes()).into();
        Self(digest)
    }

    /// Wrap an existing 32-byte digest.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding (64 chars).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the 64-char hex form produced by [`to_hex`](Self::to_hex).
    ///
    /// Returns `None` on wrong length or non-hex input.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", hex::encode(&self.0[..6]))
    }
}
