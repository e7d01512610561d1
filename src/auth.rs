//! Static bearer credential shared with remote workers.
//!
//! The raw token never reaches logs; only a SHA-256 fingerprint does.

use std::fmt;

use sha2::{Digest, Sha256};

/// Token the workers accept when no credential is configured.
pub const DEFAULT_WORKER_TOKEN: &str = "super-secret-key";

/// Static bearer token supplied at session creation.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Credential from configuration, treating an empty token as absent.
    pub fn from_config(token: &str) -> Option<Self> {
        let token = token.trim();
        (!token.is_empty()).then(|| Self::new(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Short hex fingerprint safe to log.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..12].to_string()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.fingerprint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_token() {
        let credential = Credential::new("hunter2");
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("hunter2"));
        assert_eq!(credential.fingerprint().len(), 12);
    }

    #[test]
    fn test_bearer_header() {
        assert_eq!(Credential::new("abc").bearer(), "Bearer abc");
    }

    #[test]
    fn test_empty_config_is_absent() {
        assert!(Credential::from_config("  ").is_none());
        assert_eq!(Credential::from_config(" tok ").unwrap().as_str(), "tok");
    }
}
