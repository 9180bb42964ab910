//! Key material loading.
//!
//! The relying party holds four RSA keys, read once at startup from fixed
//! file names in the key directory:
//!
//! | File | Role |
//! |------|------|
//! | `sp-signing-key.pem` | request objects and client assertions |
//! | `sandbox-sp-key.pem` | ID token decryption |
//! | `sandbox-sp-entity-signing-key.pem` | signed JWKS and entity statement |
//! | `sandbox-isb-entity-signing-pubkey.pem` | pinned broker trust anchor |
//!
//! Every key is parsed when loaded. If any of them is missing or malformed
//! the [`KeyStore`] is `Unavailable` and every operation needing keys fails
//! with `RpError::KeyLoad`.

use crate::errors::RpError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use common::secret::{ExposeSecret, SecretString};
use josekit::jwe::alg::rsaes::RsaesJweDecrypter;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub const SIGNING_KEY_FILE: &str = "sp-signing-key.pem";
pub const ENCRYPTION_KEY_FILE: &str = "sandbox-sp-key.pem";
pub const ENTITY_KEY_FILE: &str = "sandbox-sp-entity-signing-key.pem";
pub const BROKER_ENTITY_PUBLIC_KEY_FILE: &str = "sandbox-isb-entity-signing-pubkey.pem";

/// Smallest accepted modulus (2048 bits).
const MIN_RSA_KEY_BYTES: usize = 256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyLoadError {
    #[error("Failed to read {file}: {reason}")]
    Read { file: String, reason: String },

    #[error("Failed to parse {role} key: {reason}")]
    Parse { role: &'static str, reason: String },

    #[error("The {role} key is too small: {bits} bits")]
    TooSmall { role: &'static str, bits: usize },
}

// =============================================================================
// Public key components
// =============================================================================

/// Base64url modulus and exponent of an RSA public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicComponents {
    pub n: String,
    pub e: String,
}

impl RsaPublicComponents {
    fn from_key(key: &RsaPublicKey) -> Self {
        Self {
            n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        }
    }

    /// RFC 7638 thumbprint: SHA-256 over the required members in
    /// lexicographic order, base64url encoded.
    pub fn thumbprint(&self) -> String {
        let canonical = format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, self.e, self.n);
        URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
    }

    /// Public JWK published for this key.
    pub fn to_jwk(&self, key_use: &str, alg: &str) -> PublicJwk {
        PublicJwk {
            kty: "RSA".to_string(),
            kid: self.thumbprint(),
            key_use: key_use.to_string(),
            alg: alg.to_string(),
            n: self.n.clone(),
            e: self.e.clone(),
        }
    }
}

/// RSA public JWK as published in trust documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicJwk {
    pub kty: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    pub n: String,
    pub e: String,
}

// =============================================================================
// Keys by role
// =============================================================================

/// Private key used to produce RS256 signatures.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    encoding_key: EncodingKey,
    public: RsaPublicComponents,
}

impl SigningKey {
    pub fn from_pem(role: &'static str, pem: &SecretString) -> Result<Self, KeyLoadError> {
        let public = parse_private_components(role, pem)?;
        let encoding_key =
            EncodingKey::from_rsa_pem(pem.expose_secret().as_bytes()).map_err(|e| {
                KeyLoadError::Parse {
                    role,
                    reason: e.to_string(),
                }
            })?;

        Ok(Self {
            kid: public.thumbprint(),
            encoding_key,
            public,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn public(&self) -> &RsaPublicComponents {
        &self.public
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("encoding_key", &"[REDACTED]")
            .finish()
    }
}

/// Private key used to unwrap RSA-OAEP encrypted ID tokens.
#[derive(Clone)]
pub struct DecryptionKey {
    kid: String,
    decrypter: RsaesJweDecrypter,
    public: RsaPublicComponents,
}

impl DecryptionKey {
    pub fn from_pem(role: &'static str, pem: &SecretString) -> Result<Self, KeyLoadError> {
        let public = parse_private_components(role, pem)?;
        let decrypter = josekit::jwe::RSA_OAEP
            .decrypter_from_pem(pem.expose_secret().as_bytes())
            .map_err(|e| KeyLoadError::Parse {
                role,
                reason: e.to_string(),
            })?;

        Ok(Self {
            kid: public.thumbprint(),
            decrypter,
            public,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn decrypter(&self) -> &RsaesJweDecrypter {
        &self.decrypter
    }

    pub fn public(&self) -> &RsaPublicComponents {
        &self.public
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("kid", &self.kid)
            .field("decrypter", &"[REDACTED]")
            .finish()
    }
}

/// Pinned public key that must sign the broker's JWKS document.
#[derive(Clone)]
pub struct TrustAnchor {
    kid: String,
    decoding_key: DecodingKey,
}

impl TrustAnchor {
    pub fn from_pem(role: &'static str, pem: &str) -> Result<Self, KeyLoadError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| KeyLoadError::Parse {
                role,
                reason: e.to_string(),
            })?;
        check_size(role, key.size())?;

        let public = RsaPublicComponents::from_key(&key);
        let decoding_key = DecodingKey::from_rsa_components(&public.n, &public.e).map_err(|e| {
            KeyLoadError::Parse {
                role,
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            kid: public.thumbprint(),
            decoding_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustAnchor").field("kid", &self.kid).finish()
    }
}

fn parse_private_components(
    role: &'static str,
    pem: &SecretString,
) -> Result<RsaPublicComponents, KeyLoadError> {
    let pem = pem.expose_secret();
    let key = RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| KeyLoadError::Parse {
            role,
            reason: e.to_string(),
        })?;
    check_size(role, key.size())?;

    Ok(RsaPublicComponents::from_key(&key.to_public_key()))
}

fn check_size(role: &'static str, size_bytes: usize) -> Result<(), KeyLoadError> {
    if size_bytes < MIN_RSA_KEY_BYTES {
        return Err(KeyLoadError::TooSmall {
            role,
            bits: size_bytes * 8,
        });
    }
    Ok(())
}

// =============================================================================
// Key store
// =============================================================================

/// PEM contents of the four key files.
#[derive(Debug)]
pub struct KeyPems {
    pub signing: SecretString,
    pub encryption: SecretString,
    pub entity: SecretString,
    pub broker_entity_public: String,
}

/// All parsed keys. Immutable after load.
#[derive(Debug)]
pub struct KeyMaterial {
    pub signing: SigningKey,
    pub encryption: DecryptionKey,
    pub entity: SigningKey,
    pub broker_anchor: TrustAnchor,
}

impl KeyMaterial {
    pub fn from_pems(pems: &KeyPems) -> Result<Self, KeyLoadError> {
        Ok(Self {
            signing: SigningKey::from_pem("signing", &pems.signing)?,
            encryption: DecryptionKey::from_pem("encryption", &pems.encryption)?,
            entity: SigningKey::from_pem("entity", &pems.entity)?,
            broker_anchor: TrustAnchor::from_pem("broker entity", &pems.broker_entity_public)?,
        })
    }
}

/// Loaded key material, or the reason it is missing.
#[derive(Debug, Clone)]
pub enum KeyStore {
    Available(Arc<KeyMaterial>),
    Unavailable { reason: String },
}

impl KeyStore {
    /// Read and parse the key files from `dir`.
    ///
    /// Never fails: a load error is logged and yields `Unavailable` so the
    /// service can still start and report the problem per request.
    pub fn load_from_dir(dir: &Path) -> Self {
        tracing::info!(target: "rp.crypto", dir = %dir.display(), "Loading keys from directory");

        match read_pems(dir).and_then(|pems| KeyMaterial::from_pems(&pems)) {
            Ok(material) => {
                tracing::info!(
                    target: "rp.crypto",
                    signing_kid = %material.signing.kid(),
                    encryption_kid = %material.encryption.kid(),
                    entity_kid = %material.entity.kid(),
                    "Keys loaded"
                );
                KeyStore::Available(Arc::new(material))
            }
            Err(e) => {
                tracing::error!(target: "rp.crypto", error = %e, "Key loading failed");
                KeyStore::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn from_pems(pems: &KeyPems) -> Result<Self, KeyLoadError> {
        Ok(KeyStore::Available(Arc::new(KeyMaterial::from_pems(pems)?)))
    }

    pub fn is_available(&self) -> bool {
        matches!(self, KeyStore::Available(_))
    }

    /// Borrow the key material.
    ///
    /// # Errors
    ///
    /// `RpError::KeyLoad` when the keys failed to load.
    pub fn material(&self) -> Result<&KeyMaterial, RpError> {
        match self {
            KeyStore::Available(material) => Ok(material),
            KeyStore::Unavailable { reason } => Err(RpError::KeyLoad(reason.clone())),
        }
    }
}

fn read_pems(dir: &Path) -> Result<KeyPems, KeyLoadError> {
    let read = |file: &str| {
        std::fs::read_to_string(dir.join(file)).map_err(|e| KeyLoadError::Read {
            file: file.to_string(),
            reason: e.to_string(),
        })
    };

    Ok(KeyPems {
        signing: SecretString::from(read(SIGNING_KEY_FILE)?),
        encryption: SecretString::from(read(ENCRYPTION_KEY_FILE)?),
        entity: SecretString::from(read(ENTITY_KEY_FILE)?),
        broker_entity_public: read(BROKER_ENTITY_PUBLIC_KEY_FILE)?,
    })
}
