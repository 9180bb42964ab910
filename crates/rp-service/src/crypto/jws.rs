//! RS256 compact JWS signing and verification.

use crate::crypto::keys::SigningKey;
use crate::errors::RpError;
use common::jwt::{peek_jws_header, CompactHeader, CompactTokenError, JWS_ALGORITHM};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum JwsError {
    #[error(transparent)]
    Compact(#[from] CompactTokenError),

    #[error("Algorithm not allowed: {0}")]
    AlgorithmNotAllowed(String),

    #[error("Verification failed: {0}")]
    Verification(#[from] jsonwebtoken::errors::Error),
}

/// Sign `claims` as a compact JWS.
///
/// The header carries `alg=RS256`, the key's thumbprint as `kid` and `typ`
/// when given.
#[instrument(skip_all)]
pub fn sign<T: Serialize>(claims: &T, key: &SigningKey, typ: Option<&str>) -> Result<String, RpError> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(key.kid().to_string());
    header.typ = typ.map(str::to_string);

    encode(&header, claims, key.encoding_key()).map_err(|e| {
        tracing::error!(target: "rp.crypto", error = %e, kid = %key.kid(), "JWS signing failed");
        RpError::Signing(format!("JWS signing failed: {e}"))
    })
}

/// Read the header of a JWS and require RS256.
pub fn header(token: &str) -> Result<CompactHeader, JwsError> {
    let header = peek_jws_header(token)?;
    match header.alg.as_deref() {
        Some(JWS_ALGORITHM) => Ok(header),
        other => {
            let alg = other.unwrap_or("none").to_string();
            tracing::debug!(target: "rp.crypto", alg = %alg, "JWS rejected: algorithm not allowed");
            Err(JwsError::AlgorithmNotAllowed(alg))
        }
    }
}

/// Validation preset: RS256 only, `exp` required, no leeway.
///
/// Callers add issuer and audience rules on top.
pub fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp"]);
    validation
}

/// Verify a JWS and deserialize its payload.
#[instrument(skip_all)]
pub fn verify<T: DeserializeOwned>(
    token: &str,
    key: &DecodingKey,
    validation: &Validation,
) -> Result<T, JwsError> {
    header(token)?;

    let data = decode::<T>(token, key, validation).map_err(|e| {
        tracing::debug!(target: "rp.crypto", error = %e, "JWS verification failed");
        e
    })?;

    Ok(data.claims)
}
