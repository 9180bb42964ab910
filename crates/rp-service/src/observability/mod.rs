//! Observability helpers for the relying party.
//!
//! # Privacy by Default
//!
//! Pipeline functions use `#[instrument(skip_all)]` and add fields explicitly.
//! Fields fall into three groups:
//! - **SAFE**: logged as-is (error categories, key ids, durations)
//! - **HASHED**: SHA-256 truncated for correlation (ID token `sub`)
//! - **NEVER**: tokens, authorization codes, key material, personal data

pub mod metrics;

use sha2::{Digest, Sha256};

/// Hash a value for log correlation (SHA-256, first 8 hex chars).
///
/// Used for the ID token subject so that one identification can be followed
/// across log lines without writing the subject itself.
pub fn hash_for_correlation(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(digest.get(..4).unwrap_or_default())
}

/// Error categories for metric labels (bounded cardinality).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Local key material missing or unusable
    KeyMaterial,
    /// Decryption or signature failures
    Cryptographic,
    /// Broker key set could not be fetched or trusted
    Trust,
    /// Token endpoint communication failed
    Broker,
    /// State or nonce did not match the session
    Session,
    /// Configuration and internal errors
    Internal,
}

impl ErrorCategory {
    /// Label value used in metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::KeyMaterial => "key_material",
            ErrorCategory::Cryptographic => "cryptographic",
            ErrorCategory::Trust => "trust",
            ErrorCategory::Broker => "broker",
            ErrorCategory::Session => "session",
            ErrorCategory::Internal => "internal",
        }
    }
}
