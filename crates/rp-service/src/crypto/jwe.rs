//! Decryption of encrypted ID tokens.
//!
//! Only `alg=RSA-OAEP` with `enc=A128CBC-HS256` is accepted. Both are read
//! from the protected header and checked before any key operation.

use crate::crypto::keys::DecryptionKey;
use crate::errors::RpError;
use common::jwt::{peek_jwe_header, JWE_CONTENT_ENCRYPTION, JWE_KEY_ALGORITHM};
use common::secret::SecretString;
use tracing::instrument;

/// Decrypt a compact JWE and return the plaintext (the nested JWS).
///
/// # Errors
///
/// `RpError::Decryption` for a malformed token, a disallowed algorithm, a
/// token encrypted to another key or tampered ciphertext. The detail goes to
/// the log only.
#[instrument(skip_all)]
pub fn decrypt(token: &str, key: &DecryptionKey) -> Result<SecretString, RpError> {
    let header = peek_jwe_header(token).map_err(|e| {
        tracing::warn!(target: "rp.crypto", error = %e, "Encrypted token is malformed");
        RpError::Decryption(e.to_string())
    })?;

    if header.alg.as_deref() != Some(JWE_KEY_ALGORITHM)
        || header.enc.as_deref() != Some(JWE_CONTENT_ENCRYPTION)
    {
        tracing::warn!(
            target: "rp.crypto",
            alg = ?header.alg,
            enc = ?header.enc,
            "Encrypted token rejected: algorithm not allowed"
        );
        return Err(RpError::Decryption(
            "Encryption algorithm not allowed".to_string(),
        ));
    }

    tracing::debug!(
        target: "rp.crypto",
        kid = %key.kid(),
        token_kid = ?header.kid,
        "Decrypting with key"
    );

    let (plaintext, _) = josekit::jwe::deserialize_compact(token, key.decrypter()).map_err(|e| {
        tracing::warn!(target: "rp.crypto", error = %e, "Token decryption failed");
        RpError::Decryption(e.to_string())
    })?;

    let plaintext = String::from_utf8(plaintext).map_err(|e| {
        tracing::warn!(target: "rp.crypto", error = %e, "Decrypted payload is not UTF-8");
        RpError::Decryption("Decrypted payload is not UTF-8".to_string())
    })?;

    tracing::debug!(target: "rp.crypto", "Decryption succeeded");
    Ok(SecretString::from(plaintext))
}
