//! ID token verification against the broker key set.

use crate::crypto::jws;
use crate::errors::RpError;
use crate::services::broker_keys::BrokerKeySet;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, PublicKeyUse};
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

/// Clock skew tolerated on `exp` and `nbf` of ID tokens.
pub const ID_TOKEN_CLOCK_SKEW_SECONDS: u64 = 60;

/// What a verified ID token must assert.
#[derive(Debug, Clone, Copy)]
pub struct IdTokenExpectations<'a> {
    /// Broker origin, `https://{broker host}`
    pub issuer: &'a str,
    /// Our client id
    pub audience: &'a str,
}

/// `aud` as a single value or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Audience::One(aud) => aud == value,
            Audience::Many(list) => list.iter().any(|aud| aud == value),
        }
    }
}

/// Claims of a verified ID token.
///
/// Only built by [`verify`]. Claims the relying party does not read stay in
/// `extra`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedClaims {
    pub sub: String,
    pub iss: String,
    pub aud: Audience,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_identity_code: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Personal data is redacted from debug output.
impl fmt::Debug for VerifiedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedClaims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("auth_time", &self.auth_time)
            .field("personal_data", &"[REDACTED]")
            .field("extra_claims", &self.extra.len())
            .finish()
    }
}

/// Verify a signed ID token with the broker key set.
///
/// The key is picked by `kid`. Without a `kid`, every RSA signature key of
/// the set is tried in order.
///
/// # Errors
///
/// `RpError::SignatureVerification` for any failure.
#[instrument(skip_all)]
pub fn verify(
    token: &str,
    key_set: &BrokerKeySet,
    expectations: IdTokenExpectations<'_>,
) -> Result<VerifiedClaims, RpError> {
    let header = jws::header(token).map_err(|e| {
        tracing::warn!(target: "rp.pipeline", error = %e, "ID token header rejected");
        RpError::SignatureVerification(e.to_string())
    })?;

    let validation = id_token_validation(expectations);

    let candidates: Vec<&Jwk> = match header.kid.as_deref() {
        Some(kid) => match key_set.find(kid) {
            Some(jwk) => vec![jwk],
            None => {
                tracing::warn!(target: "rp.pipeline", kid = %kid, "No broker key for ID token kid");
                return Err(RpError::SignatureVerification(format!(
                    "No broker key with kid {kid}"
                )));
            }
        },
        None => key_set.keys.keys.iter().filter(|jwk| is_rsa_signing_key(jwk)).collect(),
    };

    let mut last_error = String::from("No usable broker signing key");
    for jwk in candidates {
        let key = match DecodingKey::from_jwk(jwk) {
            Ok(key) => key,
            Err(e) => {
                last_error = format!("Unusable broker key: {e}");
                continue;
            }
        };

        match jws::verify::<VerifiedClaims>(token, &key, &validation) {
            Ok(claims) => {
                tracing::debug!(
                    target: "rp.pipeline",
                    kid = ?jwk.common.key_id,
                    "ID token signature verified"
                );
                return Ok(claims);
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    tracing::warn!(target: "rp.pipeline", error = %last_error, "ID token verification failed");
    Err(RpError::SignatureVerification(last_error))
}

fn id_token_validation(expectations: IdTokenExpectations<'_>) -> Validation {
    let mut validation = jws::strict_validation();
    validation.leeway = ID_TOKEN_CLOCK_SKEW_SECONDS;
    validation.validate_aud = true;
    validation.set_issuer(&[expectations.issuer]);
    validation.set_audience(&[expectations.audience]);
    validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
    validation
}

fn is_rsa_signing_key(jwk: &Jwk) -> bool {
    let signing_use = !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption));
    matches!(jwk.algorithm, AlgorithmParameters::RSA(_)) && signing_use
}
