//! Stable SHA-256 fingerprints
//!
//! Fingerprints feed cache keys, so their byte layout must never change
//! between releases for the same logical input.

use sha2::{Digest, Sha256};

/// Incremental fingerprint builder
///
/// Every part is length-prefixed so that `("ab", "c")` and `("a", "bc")`
/// produce different digests.
#[derive(Clone, Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a labelled domain separator
    pub fn domain(self, label: &str) -> Self {
        self.bytes(label.as_bytes())
    }

    /// Add a length-prefixed byte slice
    pub fn bytes(mut self, bytes: &[u8]) -> Self {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    pub fn str(self, s: &str) -> Self {
        self.bytes(s.as_bytes())
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    /// Finish and return the lowercase hex digest
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// SHA-256 of raw content as lowercase hex
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
