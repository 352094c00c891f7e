//! Opaque token blobs
//!
//! OAuth material is persisted by the host. The engine only moves the
//! bytes between the host and whatever acquires tokens; it never looks
//! inside.

use std::fmt;
use zeroize::Zeroize;

/// Host-persisted credential bytes
#[derive(Clone, PartialEq, Eq)]
pub struct TokenBlob {
    bytes: Vec<u8>,
}

impl TokenBlob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Empty blob, meaning "no stored token"
    pub fn empty() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Raw bytes, for handing to the token consumer
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length (safe to log)
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `None` for an empty blob
    pub fn into_option(self) -> Option<Self> {
        if self.is_empty() { None } else { Some(self) }
    }
}

impl fmt::Debug for TokenBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenBlob([redacted; {} bytes])", self.bytes.len())
    }
}

impl Drop for TokenBlob {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl From<Vec<u8>> for TokenBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&str> for TokenBlob {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let blob = TokenBlob::from("{\"access_token\":\"secret\"}");
        let debug = format!("{:?}", blob);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("25 bytes"));
    }

    #[test]
    fn test_empty_means_absent() {
        assert!(TokenBlob::empty().into_option().is_none());
        assert_eq!(
            TokenBlob::from("t").into_option().map(|b| b.as_bytes().to_vec()),
            Some(b"t".to_vec())
        );
    }
}
