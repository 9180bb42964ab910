//! Simulated identity broker.
//!
//! [`MockBroker`] wraps a wiremock server and mounts the broker endpoints the
//! relying party calls:
//!
//! - `GET /jwks/broker-signed` - signed JWKS (broker entity key)
//! - `POST /oauth/token` - token response with an encrypted ID token
//! - `GET /api/embedded-ui/{client_id}` - identification wall data
//!
//! The free functions build the documents and tokens those endpoints return.

use crate::crypto_fixtures::{
    BROKER_ENTITY_KEY_PEM, BROKER_SIGNING_KEY_PEM, BROKER_SIGNING_PUBLIC_KEY_PEM,
    FOREIGN_PUBLIC_KEY_PEM,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde_json::{json, Value};
use std::collections::HashMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Host name the simulated broker answers for.
pub const BROKER_HOST: &str = "isb.test";

/// Broker issuer, `https://{BROKER_HOST}`.
pub const BROKER_ISSUER: &str = "https://isb.test";

/// `kid` of the broker ID token signing key.
pub const BROKER_SIGNING_KID: &str = "broker-sig-1";

/// Client id registered at the simulated broker.
pub const TEST_CLIENT_ID: &str = "saippua-client";

/// `auth_time` of test ID tokens: November 15, 12:13 AM in Helsinki.
pub const TEST_AUTH_TIME: i64 = 1_700_000_000;

pub const TEST_SUBJECT: &str = "3f2f1d2c-test-subject";

pub const TEST_PERSONAL_IDENTITY_CODE: &str = "210281-9988";

/// Broker signed JWKS with the broker signing key, signed by the broker entity key.
pub fn signed_jwks_document(iss: &str, sub: &str, exp: i64) -> String {
    signed_jwks_document_with_key(BROKER_ENTITY_KEY_PEM, iss, sub, exp)
}

/// Broker signed JWKS signed by `signer_pem`.
pub fn signed_jwks_document_with_key(signer_pem: &str, iss: &str, sub: &str, exp: i64) -> String {
    let claims = json!({
        "keys": [broker_signing_jwk(Some(BROKER_SIGNING_KID))],
        "iss": iss,
        "sub": sub,
        "iat": Utc::now().timestamp(),
        "exp": exp,
    });
    sign_rs256(&claims, signer_pem, None)
}

/// Public JWK of the broker ID token signing key.
pub fn broker_signing_jwk(kid: Option<&str>) -> Value {
    rsa_signing_jwk(BROKER_SIGNING_PUBLIC_KEY_PEM, kid)
}

/// Public JWK of a key that signs nothing the relying party trusts.
pub fn foreign_jwk(kid: Option<&str>) -> Value {
    rsa_signing_jwk(FOREIGN_PUBLIC_KEY_PEM, kid)
}

/// Sign ID token claims with the broker signing key.
pub fn sign_id_token(claims: &Value, kid: Option<&str>) -> String {
    sign_rs256(claims, BROKER_SIGNING_KEY_PEM, kid)
}

/// Claims of a valid ID token for `client_id`.
pub fn id_token_claims(client_id: &str, nonce: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": BROKER_ISSUER,
        "sub": TEST_SUBJECT,
        "aud": client_id,
        "exp": now + 600,
        "iat": now,
        "nonce": nonce,
        "auth_time": TEST_AUTH_TIME,
        "name": "Väinö Tunnistus",
        "given_name": "Väinö",
        "family_name": "Tunnistus",
        "birthdate": "1981-02-21",
        "personal_identity_code": TEST_PERSONAL_IDENTITY_CODE,
    })
}

fn sign_rs256(claims: &Value, signer_pem: &str, kid: Option<&str>) -> String {
    let key = EncodingKey::from_rsa_pem(signer_pem.as_bytes()).expect("fixture key should load");
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    jsonwebtoken::encode(&header, claims, &key).expect("signing should succeed")
}

fn rsa_signing_jwk(public_pem: &str, kid: Option<&str>) -> Value {
    let key = RsaPublicKey::from_public_key_pem(public_pem).expect("fixture public key should load");

    let mut jwk = json!({
        "kty": "RSA",
        "use": "sig",
        "alg": "RS256",
        "n": URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
        "e": URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
    });
    if let Some(kid) = kid {
        jwk["kid"] = json!(kid);
    }
    jwk
}

/// Wiremock-backed broker.
pub struct MockBroker {
    server: MockServer,
}

impl MockBroker {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL, used as `ISB_BASE_URL`.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Serve `body` at the signed JWKS path, expecting exactly `expected_calls` fetches.
    pub async fn mount_signed_jwks(&self, body: String, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/jwks/broker-signed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// Serve a valid signed JWKS that expires in one hour.
    pub async fn mount_valid_jwks(&self, expected_calls: u64) {
        let exp = Utc::now().timestamp() + 3600;
        self.mount_signed_jwks(signed_jwks_document(BROKER_ISSUER, BROKER_ISSUER, exp), expected_calls)
            .await;
    }

    /// Answer token requests with `id_token`.
    pub async fn mount_token_response(&self, id_token: String) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "opaque-access-token",
                "token_type": "Bearer",
                "expires_in": 600,
                "id_token": id_token,
            })))
            .mount(&self.server)
            .await;
    }

    /// Answer only the next token request with `id_token`.
    ///
    /// Use when one test runs several identifications, each with its own nonce.
    pub async fn mount_token_response_once(&self, id_token: String) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "opaque-access-token",
                "token_type": "Bearer",
                "expires_in": 600,
                "id_token": id_token,
            })))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Answer token requests with `status` and an OAuth error body.
    pub async fn mount_token_error(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({ "error": "invalid_grant" })),
            )
            .mount(&self.server)
            .await;
    }

    /// Fail the test if the token endpoint is called at all.
    pub async fn expect_no_token_requests(&self) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&self.server)
            .await;
    }

    /// Serve the identification wall data for `client_id`.
    pub async fn mount_embedded_ui(&self, client_id: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/api/embedded-ui/{client_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(&self.server)
            .await;
    }

    /// Form fields of the last token request, if any.
    pub async fn token_request_form(&self) -> Option<HashMap<String, String>> {
        let requests = self.server.received_requests().await?;
        let request = requests
            .iter()
            .rev()
            .find(|r| r.method.as_str() == "POST" && r.url.path() == "/oauth/token")?;

        Some(
            form_urlencoded::parse(&request.body)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        )
    }

    /// Number of requests received on `request_path`.
    pub async fn request_count(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}
