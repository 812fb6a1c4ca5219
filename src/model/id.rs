//! Document identity derived with BLAKE3

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static MINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A 32-byte identity naming one document (all of its versions)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId([u8; 32]);

impl DocumentId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        DocumentId(bytes)
    }

    /// Digest a sequence of fields.
    ///
    /// Every part is length-prefixed, so `["ab", "c"]` and `["a", "bc"]` never
    /// produce the same identity.
    pub fn derive(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        DocumentId(*hasher.finalize().as_bytes())
    }

    /// Mint an identity that no other call will return, salted with `seed`
    pub fn mint(seed: &[u8]) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let counter = MINT_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::derive(&[
            b"mint",
            seed,
            &nanos.to_le_bytes(),
            &counter.to_le_bytes(),
            &std::process::id().to_le_bytes(),
        ])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(DocumentId(arr))
    }

    /// Short prefix for log lines
    pub fn short(&self) -> String {
        self.to_hex()[..10].to_string()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.short())
    }
}

impl std::str::FromStr for DocumentId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_stable() {
        let a = DocumentId::derive(&[b"family", b"did:key:z6Mk"]);
        let b = DocumentId::derive(&[b"family", b"did:key:z6Mk"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_is_length_prefixed() {
        let a = DocumentId::derive(&[b"ab", b"c"]);
        let b = DocumentId::derive(&[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_mint_is_unique() {
        let a = DocumentId::mint(b"seed");
        let b = DocumentId::mint(b"seed");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_parse() {
        let id = DocumentId::derive(&[b"x"]);
        let parsed: DocumentId = id.to_hex().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(DocumentId::from_hex("abcd").is_err());
    }
}
