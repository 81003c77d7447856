//! Integrity: whole-file SHA-256, rendered as lowercase hex for END frames.

use sha2::{Digest, Sha256};

/// Incremental content hash. Feed blocks in file order.
#[derive(Default, Clone)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, block: &[u8]) {
        self.inner.update(block);
    }

    /// 64 lowercase hex characters.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// Hash a complete buffer.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(bytes);
    hasher.finalize_hex()
}

/// Compare two hex digests, ignoring case.
pub fn hashes_match(expected: &str, actual: &str) -> bool {
    expected.len() == actual.len() && expected.eq_ignore_ascii_case(actual)
}
