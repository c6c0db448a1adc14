use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content checksum of a stored file.
///
/// The BLAKE3 digest of the file's bytes in chunk order, domain-separated so
/// a file checksum can never collide with a raw BLAKE3 hash of the same data.
/// Client and backend must both compute it with [`ChecksumHasher`] for the
/// integrity comparison to be meaningful.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Checksum of a contiguous byte slice.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = ChecksumHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Create a checksum from a pre-computed digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.short_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for Checksum {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Checksum> for String {
    fn from(checksum: Checksum) -> Self {
        checksum.to_hex()
    }
}

/// Incremental, domain-separated BLAKE3 hasher for file content.
///
/// Feeding the same bytes in any segmentation yields the same [`Checksum`],
/// so a checksum over a chunk sequence equals the checksum over the
/// concatenated stream.
#[derive(Clone)]
pub struct ChecksumHasher {
    inner: blake3::Hasher,
}

impl ChecksumHasher {
    /// Domain tag prepended to every file checksum.
    pub const DOMAIN: &'static str = "cos-file-v1";

    /// Start a new checksum computation.
    pub fn new() -> Self {
        let mut inner = blake3::Hasher::new();
        inner.update(Self::DOMAIN.as_bytes());
        inner.update(b":");
        Self { inner }
    }

    /// Feed the next segment of content.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Finish and return the checksum.
    pub fn finalize(&self) -> Checksum {
        Checksum(*self.inner.finalize().as_bytes())
    }
}

impl Default for ChecksumHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_deterministic() {
        assert_eq!(Checksum::of(b"hello world"), Checksum::of(b"hello world"));
    }

    #[test]
    fn different_content_produces_different_checksums() {
        assert_ne!(Checksum::of(b"hello"), Checksum::of(b"world"));
    }

    #[test]
    fn segmentation_does_not_matter() {
        let mut hasher = ChecksumHasher::new();
        hasher.update(b"hel").update(b"lo wo").update(b"rld");
        assert_eq!(hasher.finalize(), Checksum::of(b"hello world"));
    }

    #[test]
    fn domain_separated_from_raw_blake3() {
        let raw = *blake3::hash(b"data").as_bytes();
        assert_ne!(*Checksum::of(b"data").as_bytes(), raw);
    }

    #[test]
    fn empty_content_has_a_checksum() {
        let empty = ChecksumHasher::new().finalize();
        assert_eq!(empty, Checksum::of(b""));
    }

    #[test]
    fn hex_roundtrip() {
        let c = Checksum::of(b"test");
        assert_eq!(Checksum::from_hex(&c.to_hex()).unwrap(), c);
        assert_eq!(format!("{c}").len(), 64);
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert!(matches!(
            Checksum::from_hex("zz"),
            Err(TypeError::InvalidHex(_))
        ));
        assert_eq!(
            Checksum::from_hex("abcd"),
            Err(TypeError::InvalidLength {
                expected: 32,
                actual: 2
            })
        );
    }

    #[test]
    fn serde_uses_hex_string() {
        let c = Checksum::of(b"serde");
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, format!("\"{}\"", c.to_hex()));
        let parsed: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, c);
    }
}
