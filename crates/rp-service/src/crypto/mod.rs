//! Cryptographic primitives of the token-trust pipeline.
//!
//! - `keys` - key material loading and RFC 7638 key ids
//! - `jws` - RS256 signing and verification
//! - `jwe` - RSA-OAEP / A128CBC-HS256 decryption

pub mod jwe;
pub mod jws;
pub mod keys;

use crate::errors::RpError;
use ring::rand::{SecureRandom, SystemRandom};

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(len: usize) -> Result<Vec<u8>, RpError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|e| RpError::Internal(format!("Random bytes generation failed: {e}")))?;
    Ok(bytes)
}

/// Generate a 22 character hex token for `state` and `nonce`.
pub fn generate_flow_token() -> Result<String, RpError> {
    Ok(hex::encode(generate_random_bytes(11)?))
}
