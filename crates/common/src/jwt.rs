//! Compact JOSE token inspection shared by the relying-party crates.
//!
//! Provides:
//! - Size limits applied before any parsing
//! - Unverified header peeking for JWS (3 segments) and JWE (5 segments)
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE base64 decoding
//! - Header values returned here are untrusted; they are only used to pick a
//!   key or to reject a disallowed algorithm early. Signature verification
//!   and decryption still decide whether a token is accepted.
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{peek_jws_header, JWS_ALGORITHM};
//!
//! let header = peek_jws_header(token)?;
//! if header.alg.as_deref() != Some(JWS_ALGORITHM) {
//!     return Err(...);
//! }
//! let kid = header.kid;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted compact token size in bytes (16KB).
///
/// An RSA-2048 JWE wrapping a signed ID token with the full FTN attribute set
/// is around 3KB and the broker's signed JWKS stays well below 8KB.
pub const MAX_COMPACT_TOKEN_BYTES: usize = 16 * 1024;

/// The only signature algorithm accepted or produced.
pub const JWS_ALGORITHM: &str = "RS256";

/// The only key management algorithm accepted for encrypted ID tokens.
pub const JWE_KEY_ALGORITHM: &str = "RSA-OAEP";

/// The only content encryption algorithm accepted for encrypted ID tokens.
pub const JWE_CONTENT_ENCRYPTION: &str = "A128CBC-HS256";

const JWS_SEGMENTS: usize = 3;
const JWE_SEGMENTS: usize = 5;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while inspecting a compact token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompactTokenError {
    /// Token size exceeds [`MAX_COMPACT_TOKEN_BYTES`].
    #[error("Token exceeds maximum size")]
    TokenTooLarge,

    /// Token is not a well-formed compact serialization.
    #[error("Token is malformed")]
    MalformedToken,
}

// =============================================================================
// Header
// =============================================================================

/// Protected header fields read before verification or decryption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompactHeader {
    /// Signature or key management algorithm.
    #[serde(default)]
    pub alg: Option<String>,

    /// Content encryption algorithm (JWE only).
    #[serde(default)]
    pub enc: Option<String>,

    /// Key identifier.
    #[serde(default)]
    pub kid: Option<String>,

    /// Media type of the complete token.
    #[serde(default)]
    pub typ: Option<String>,

    /// Media type of the payload (`JWT` for nested tokens).
    #[serde(default)]
    pub cty: Option<String>,
}

/// Read the protected header of a compact JWS without verifying it.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds [`MAX_COMPACT_TOKEN_BYTES`]
/// - `MalformedToken` - Wrong segment count, bad base64 or bad JSON
pub fn peek_jws_header(token: &str) -> Result<CompactHeader, CompactTokenError> {
    peek_header(token, JWS_SEGMENTS)
}

/// Read the protected header of a compact JWE without decrypting it.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds [`MAX_COMPACT_TOKEN_BYTES`]
/// - `MalformedToken` - Wrong segment count, bad base64 or bad JSON
pub fn peek_jwe_header(token: &str) -> Result<CompactHeader, CompactTokenError> {
    peek_header(token, JWE_SEGMENTS)
}

fn peek_header(token: &str, segments: usize) -> Result<CompactHeader, CompactTokenError> {
    if token.len() > MAX_COMPACT_TOKEN_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_COMPACT_TOKEN_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(CompactTokenError::TokenTooLarge);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != segments {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            expected = segments,
            "Token rejected: wrong number of segments"
        );
        return Err(CompactTokenError::MalformedToken);
    }

    let header_part = parts.first().ok_or(CompactTokenError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode header base64");
        CompactTokenError::MalformedToken
    })?;

    serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse header JSON");
        CompactTokenError::MalformedToken
    })
}

// =============================================================================
// Tests
// =============================================================================
