//! Self-signed trust documents published for federation discovery.
//!
//! - Signed JWKS (`/signed-jwks`): our signature and encryption keys
//! - Entity statement (`/.well-known/openid-federation`): our entity key and
//!   relying party metadata
//!
//! Both are signed with the entity key and rebuilt on every request.

use crate::crypto::jws;
use crate::crypto::keys::{KeyMaterial, PublicJwk};
use crate::errors::RpError;
use common::jwt::{JWE_CONTENT_ENCRYPTION, JWE_KEY_ALGORITHM, JWS_ALGORITHM};
use serde::Serialize;

/// Signed JWKS lifetime (25 hours).
pub const SIGNED_JWKS_LIFETIME_SECONDS: i64 = 90_000;

/// Entity statement lifetime (3650 days).
pub const ENTITY_STATEMENT_LIFETIME_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

pub const ENTITY_STATEMENT_TYPE: &str = "entity-statement+jwt";

#[derive(Debug, Serialize)]
struct SignedJwksClaims {
    keys: Vec<PublicJwk>,
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Serialize)]
struct JwksBody {
    keys: Vec<PublicJwk>,
}

#[derive(Debug, Serialize)]
struct EntityStatementClaims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
    jwks: JwksBody,
    metadata: EntityMetadata,
}

#[derive(Debug, Serialize)]
struct EntityMetadata {
    openid_relying_party: RelyingPartyMetadata,
}

#[derive(Debug, Serialize)]
struct RelyingPartyMetadata {
    redirect_uris: Vec<String>,
    application_type: &'static str,
    id_token_signed_response_alg: &'static str,
    id_token_encrypted_response_alg: &'static str,
    id_token_encrypted_response_enc: &'static str,
    request_object_signing_alg: &'static str,
    token_endpoint_auth_method: &'static str,
    token_endpoint_auth_signing_alg: &'static str,
    client_registration_types: Vec<String>,
    organization_name: String,
    signed_jwks_uri: String,
}

/// Reject host values that would change the meaning of the URLs built from them.
pub fn validate_host(host: &str) -> Result<(), RpError> {
    let valid = !host.is_empty()
        && host.len() <= 253
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'));

    if valid {
        Ok(())
    } else {
        Err(RpError::Configuration("Invalid host".to_string()))
    }
}

/// Build the signed JWKS: signature and encryption public keys, signed by
/// the entity key, valid for [`SIGNED_JWKS_LIFETIME_SECONDS`].
pub fn build_signed_jwks(keys: &KeyMaterial, host: &str, now: i64) -> Result<String, RpError> {
    validate_host(host)?;
    let origin = format!("https://{host}");

    let claims = SignedJwksClaims {
        keys: vec![
            keys.signing.public().to_jwk("sig", JWS_ALGORITHM),
            keys.encryption.public().to_jwk("enc", JWE_KEY_ALGORITHM),
        ],
        iss: origin.clone(),
        sub: origin,
        iat: now,
        exp: now + SIGNED_JWKS_LIFETIME_SECONDS,
    };

    jws::sign(&claims, &keys.entity, None)
}

/// Build the entity statement, signed by the entity key with
/// `typ=entity-statement+jwt`.
pub fn build_entity_statement(
    keys: &KeyMaterial,
    host: &str,
    organization_name: &str,
    now: i64,
) -> Result<String, RpError> {
    validate_host(host)?;
    let origin = format!("https://{host}");

    let claims = EntityStatementClaims {
        iss: origin.clone(),
        sub: origin.clone(),
        iat: now,
        exp: now + ENTITY_STATEMENT_LIFETIME_SECONDS,
        jwks: JwksBody {
            keys: vec![keys.entity.public().to_jwk("sig", JWS_ALGORITHM)],
        },
        metadata: EntityMetadata {
            openid_relying_party: RelyingPartyMetadata {
                redirect_uris: vec![format!("{origin}/oauth/code")],
                application_type: "web",
                id_token_signed_response_alg: JWS_ALGORITHM,
                id_token_encrypted_response_alg: JWE_KEY_ALGORITHM,
                id_token_encrypted_response_enc: JWE_CONTENT_ENCRYPTION,
                request_object_signing_alg: JWS_ALGORITHM,
                token_endpoint_auth_method: "private_key_jwt",
                token_endpoint_auth_signing_alg: JWS_ALGORITHM,
                client_registration_types: vec![],
                organization_name: organization_name.to_string(),
                signed_jwks_uri: format!("{origin}/signed-jwks"),
            },
        },
    };

    jws::sign(&claims, &keys.entity, Some(ENTITY_STATEMENT_TYPE))
}
