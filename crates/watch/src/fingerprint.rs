//! Content fingerprints for change detection

use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest over an ordered sequence of byte streams
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint of a single buffer
    pub fn of(bytes: &[u8]) -> Self {
        let mut fp = Fingerprinter::new();
        fp.update(bytes);
        fp.finish()
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// Incremental fingerprint builder.
///
/// Streams are hashed as one concatenation, so feeding the same files in a
/// different order gives a different fingerprint when their contents differ.
#[derive(Clone, Default)]
pub struct Fingerprinter {
    hasher: Sha256,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(self.hasher.finalize().into())
    }
}

/// Fingerprints of the configuration file and of its rule files.
///
/// Held as `Option<FingerprintPair>` by the watch loop; `None` means nothing
/// has been observed yet, which is distinct from the digest of empty input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintPair {
    pub config: Fingerprint,
    pub rules: Fingerprint,
}
