//! Structural hashes for change detection.

use serde::{Deserialize, Serialize};

/// A 64-bit structural hash, shown as 16 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaHash(pub u64);

impl SchemaHash {
    /// Parse the hex form written by `Display`.
    pub fn from_hex(s: &str) -> Option<Self> {
        u64::from_str_radix(s.trim(), 16).ok().map(SchemaHash)
    }

    /// Short prefix, used to derive temporary object names.
    pub fn short(&self) -> String {
        format!("{:08x}", (self.0 >> 32) as u32)
    }
}

impl std::fmt::Display for SchemaHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Incremental builder over blake3. Every field is length-prefixed so
/// adjacent fields cannot run into each other.
pub(crate) struct StructuralHasher {
    inner: blake3::Hasher,
}

impl StructuralHasher {
    pub(crate) fn new(domain: &str) -> Self {
        let mut hasher = Self {
            inner: blake3::Hasher::new(),
        };
        hasher.str(domain);
        hasher
    }

    pub(crate) fn str(&mut self, value: &str) -> &mut Self {
        self.inner.update(&(value.len() as u64).to_le_bytes());
        self.inner.update(value.as_bytes());
        self
    }

    pub(crate) fn u64(&mut self, value: u64) -> &mut Self {
        self.inner.update(&value.to_le_bytes());
        self
    }

    pub(crate) fn bool(&mut self, value: bool) -> &mut Self {
        self.inner.update(&[value as u8]);
        self
    }

    pub(crate) fn opt_str(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) => {
                self.bool(true);
                self.str(v)
            }
            None => self.bool(false),
        }
    }

    pub(crate) fn finish(&self) -> SchemaHash {
        let digest = self.inner.finalize();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&digest.as_bytes()[..8]);
        SchemaHash(u64::from_be_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let hash = SchemaHash(0x0123_4567_89ab_cdef);
        assert_eq!(hash.to_string(), "0123456789abcdef");
        assert_eq!(SchemaHash::from_hex("0123456789abcdef"), Some(hash));
        assert_eq!(hash.short(), "01234567");
        assert!(SchemaHash::from_hex("not hex").is_none());
    }

    #[test]
    fn test_field_boundaries() {
        let a = StructuralHasher::new("t").str("ab").str("c").finish();
        let b = StructuralHasher::new("t").str("a").str("bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn test_domain_separation() {
        let a = StructuralHasher::new("column").str("x").finish();
        let b = StructuralHasher::new("table").str("x").finish();
        assert_ne!(a, b);
    }
}
