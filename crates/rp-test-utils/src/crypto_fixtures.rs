//! Fixed RSA key fixtures and JWE helpers.
//!
//! All keys are 2048-bit RSA, private keys in PKCS#8 and public keys in SPKI
//! PEM. They exist only for tests.
//!
//! | Fixture | Role |
//! |---------|------|
//! | `SP_SIGNING_*` | request objects and client assertions |
//! | `SP_ENCRYPTION_*` | ID token encryption |
//! | `SP_ENTITY_*` | signed JWKS and entity statement |
//! | `BROKER_ENTITY_*` | broker signed JWKS (pinned trust anchor) |
//! | `BROKER_SIGNING_*` | broker ID token signatures |
//! | `FOREIGN_*` | a key nobody trusts |

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use josekit::jwe::{JweHeader, RSA_OAEP, RSA_OAEP_256};

pub const SP_SIGNING_KEY_PEM: &str = include_str!("../fixtures/sp-signing-key.pem");
pub const SP_SIGNING_PUBLIC_KEY_PEM: &str = include_str!("../fixtures/sp-signing-pubkey.pem");

pub const SP_ENCRYPTION_KEY_PEM: &str = include_str!("../fixtures/sp-encryption-key.pem");
pub const SP_ENCRYPTION_PUBLIC_KEY_PEM: &str =
    include_str!("../fixtures/sp-encryption-pubkey.pem");

pub const SP_ENTITY_KEY_PEM: &str = include_str!("../fixtures/sp-entity-key.pem");
pub const SP_ENTITY_PUBLIC_KEY_PEM: &str = include_str!("../fixtures/sp-entity-pubkey.pem");

pub const BROKER_ENTITY_KEY_PEM: &str = include_str!("../fixtures/broker-entity-key.pem");
pub const BROKER_ENTITY_PUBLIC_KEY_PEM: &str =
    include_str!("../fixtures/broker-entity-pubkey.pem");

pub const BROKER_SIGNING_KEY_PEM: &str = include_str!("../fixtures/broker-signing-key.pem");
pub const BROKER_SIGNING_PUBLIC_KEY_PEM: &str =
    include_str!("../fixtures/broker-signing-pubkey.pem");

pub const FOREIGN_KEY_PEM: &str = include_str!("../fixtures/foreign-key.pem");
pub const FOREIGN_PUBLIC_KEY_PEM: &str = include_str!("../fixtures/foreign-pubkey.pem");

/// Key management algorithms the fixtures can encrypt with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JweAlgorithms {
    RsaOaep,
    RsaOaep256,
}

/// Encrypt `plaintext` the way the broker does: RSA-OAEP, A128CBC-HS256,
/// `cty=JWT`.
pub fn encrypt_compact(plaintext: &[u8], recipient_public_pem: &str) -> String {
    encrypt_compact_with(
        plaintext,
        recipient_public_pem,
        JweAlgorithms::RsaOaep,
        "A128CBC-HS256",
    )
}

/// Encrypt `plaintext` with a chosen key algorithm and content encryption.
pub fn encrypt_compact_with(
    plaintext: &[u8],
    recipient_public_pem: &str,
    algorithm: JweAlgorithms,
    enc: &str,
) -> String {
    let mut header = JweHeader::new();
    header.set_content_encryption(enc);
    header.set_content_type("JWT");

    let token = match algorithm {
        JweAlgorithms::RsaOaep => {
            let encrypter = RSA_OAEP
                .encrypter_from_pem(recipient_public_pem)
                .expect("fixture public key should load");
            josekit::jwe::serialize_compact(plaintext, &header, &encrypter)
        }
        JweAlgorithms::RsaOaep256 => {
            let encrypter = RSA_OAEP_256
                .encrypter_from_pem(recipient_public_pem)
                .expect("fixture public key should load");
            josekit::jwe::serialize_compact(plaintext, &header, &encrypter)
        }
    };

    token.expect("JWE serialization should succeed")
}

/// Flip one bit of the ciphertext segment of a compact JWE.
pub fn flip_ciphertext_bit(token: &str) -> String {
    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    assert_eq!(parts.len(), 5, "not a compact JWE");

    let mut ciphertext = URL_SAFE_NO_PAD
        .decode(&parts[3])
        .expect("ciphertext should be base64url");
    ciphertext[0] ^= 0x01;
    parts[3] = URL_SAFE_NO_PAD.encode(ciphertext);

    parts.join(".")
}

/// Decode the payload of a compact JWS without verifying it.
pub fn decode_jws_payload(token: &str) -> serde_json::Value {
    let payload = token.split('.').nth(1).expect("JWS should have a payload");
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .expect("payload should be base64url");
    serde_json::from_slice(&bytes).expect("payload should be JSON")
}
