//! Token-trust pipeline.
//!
//! [`TrustPipeline`] owns the key store, the broker key cache and the
//! outbound HTTP client, and exposes the operations the web layer needs:
//!
//! - sign an authorization request and build the broker redirect
//! - exchange an authorization code and verify the returned ID token
//! - build the signed JWKS and entity statement
//! - fetch the broker's embedded identification wall data

pub mod authorization;
pub mod broker_keys;
pub mod embedded_ui;
pub mod id_token;
pub mod trust_documents;

use crate::config::Config;
use crate::crypto::jwe;
use crate::crypto::keys::KeyStore;
use crate::errors::RpError;
use crate::observability::hash_for_correlation;
use crate::observability::metrics::{
    record_authorization_request, record_broker_request, record_token_verification,
    record_trust_document,
};
use authorization::{AuthRequestContext, AuthorizationRequest, CLIENT_ASSERTION_TYPE};
use broker_keys::BrokerKeyResolver;
use chrono::Utc;
use common::http::HttpClient;
use common::secret::{ExposeSecret, SecretString};
use embedded_ui::EmbeddedUiData;
use id_token::{IdTokenExpectations, VerifiedClaims};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Path of the broker token endpoint.
pub const TOKEN_ENDPOINT_PATH: &str = "/oauth/token";

/// Path prefix of the broker embedded-UI endpoint; the client id follows.
pub const EMBEDDED_UI_PATH: &str = "/api/embedded-ui";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: SecretString,
}

/// Broker endpoints, present only when `ISB_HOST` is configured.
struct BrokerEndpoints {
    host: String,
    base_url: String,
    keys: BrokerKeyResolver,
}

/// Shared state of the token-trust pipeline.
pub struct TrustPipeline {
    keys: KeyStore,
    http: HttpClient,
    broker: Option<BrokerEndpoints>,
    client_id: Option<String>,
    spname: BTreeMap<String, String>,
    organization_name: String,
}

impl TrustPipeline {
    /// Build the pipeline from configuration and loaded keys.
    ///
    /// # Errors
    ///
    /// `RpError::Internal` if the HTTP client cannot be built.
    pub fn new(config: &Config, keys: KeyStore) -> Result<Self, RpError> {
        let http = HttpClient::new(Duration::from_secs(config.broker_http_timeout_seconds))
            .map_err(|e| RpError::Internal(e.to_string()))?;

        let broker = match (config.isb_host.as_ref(), config.broker_base_url()) {
            (Some(host), Some(base_url)) => Some(BrokerEndpoints {
                host: host.clone(),
                keys: BrokerKeyResolver::new(http.clone(), &base_url, host),
                base_url,
            }),
            _ => {
                tracing::warn!(target: "rp.pipeline", "ISB_HOST is not set; identification is disabled");
                None
            }
        };

        Ok(Self {
            keys,
            http,
            broker,
            client_id: config.client_id.clone(),
            spname: config.spname.clone(),
            organization_name: config.organization_name.clone(),
        })
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Sign the request object for `context`.
    ///
    /// # Errors
    ///
    /// - `KeyLoad` - keys unavailable
    /// - `Configuration` - `CLIENT_ID` or `ISB_HOST` missing
    /// - `Signing` - signing failed
    #[instrument(skip_all)]
    pub fn sign_authorization_request(
        &self,
        context: &AuthRequestContext,
        redirect_uri: &str,
    ) -> Result<String, RpError> {
        let material = self.keys.material()?;
        let request = AuthorizationRequest {
            client_id: self.client_id.as_deref(),
            broker_host: self.broker.as_ref().map(|b| b.host.as_str()),
            redirect_uri,
            context,
            spname: &self.spname,
        };
        authorization::build_request_object(&request, &material.signing)
    }

    /// Sign the request object and return the broker authorize URL.
    pub fn authorization_redirect(
        &self,
        context: &AuthRequestContext,
        redirect_uri: &str,
    ) -> Result<String, RpError> {
        let result = self
            .sign_authorization_request(context, redirect_uri)
            .and_then(|request_object| {
                let broker = self.broker()?;
                Ok(authorization::authorization_url(&broker.host, &request_object))
            });

        record_authorization_request(if result.is_ok() { "success" } else { "error" });
        result
    }

    /// Exchange `code` at the broker token endpoint and verify the ID token.
    ///
    /// Steps run strictly in order: client assertion, token POST, JWE
    /// decryption, broker key resolution, signature and claim verification,
    /// nonce comparison.
    ///
    /// # Errors
    ///
    /// Any [`RpError`] of those steps; nothing is retried.
    #[instrument(skip_all)]
    pub async fn exchange_and_verify_id_token(
        &self,
        code: &str,
        redirect_uri: &str,
        expected_nonce: &str,
    ) -> Result<VerifiedClaims, RpError> {
        let result = self.exchange_inner(code, redirect_uri, expected_nonce).await;

        match &result {
            Ok(claims) => {
                record_token_verification("success", None);
                tracing::info!(
                    target: "rp.pipeline",
                    subject = %hash_for_correlation(&claims.sub),
                    "Identification succeeded"
                );
            }
            Err(e) => record_token_verification("error", Some(e.category().as_str())),
        }

        result
    }

    async fn exchange_inner(
        &self,
        code: &str,
        redirect_uri: &str,
        expected_nonce: &str,
    ) -> Result<VerifiedClaims, RpError> {
        let material = self.keys.material()?;
        let broker = self.broker()?;
        let client_id = self.client_id()?;

        let assertion = authorization::build_client_assertion(
            client_id,
            &broker.host,
            &material.signing,
            Utc::now().timestamp(),
        )?;

        let token_url = format!("{}{TOKEN_ENDPOINT_PATH}", broker.base_url);
        let form = [
            ("client_id", client_id),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion.expose_secret()),
        ];

        let started = Instant::now();
        let response = self
            .http
            .post_form::<TokenResponse>(&token_url, &[], &form)
            .await;
        record_broker_request(
            "token",
            if response.is_ok() { "success" } else { "error" },
            started.elapsed(),
        );
        let response = response.map_err(|e| RpError::TokenExchange(e.to_string()))?;

        let signed = jwe::decrypt(response.id_token.expose_secret(), &material.encryption)?;
        let key_set = broker.keys.resolve(&material.broker_anchor).await?;

        let issuer = format!("https://{}", broker.host);
        let claims = id_token::verify(
            signed.expose_secret(),
            &key_set,
            IdTokenExpectations {
                issuer: &issuer,
                audience: client_id,
            },
        )?;

        if claims.nonce.as_deref() != Some(expected_nonce) {
            return Err(RpError::NonceMismatch);
        }

        Ok(claims)
    }

    /// Signed JWKS for `host`.
    pub fn signed_jwks_document(&self, host: &str) -> Result<String, RpError> {
        let result = self.keys.material().and_then(|material| {
            trust_documents::build_signed_jwks(material, host, Utc::now().timestamp())
        });
        record_trust_document("signed_jwks", if result.is_ok() { "success" } else { "error" });
        result
    }

    /// Entity statement for `host`.
    pub fn entity_statement_document(&self, host: &str) -> Result<String, RpError> {
        let result = self.keys.material().and_then(|material| {
            trust_documents::build_entity_statement(
                material,
                host,
                &self.organization_name,
                Utc::now().timestamp(),
            )
        });
        record_trust_document(
            "entity_statement",
            if result.is_ok() { "success" } else { "error" },
        );
        result
    }

    /// Fetch and validate the identification wall data for `lang`.
    ///
    /// # Errors
    ///
    /// - `Configuration` - `CLIENT_ID` or `ISB_HOST` missing
    /// - `Internal` - fetch failed or the data did not validate
    #[instrument(skip_all, fields(lang = %lang))]
    pub async fn fetch_embedded_ui(&self, lang: &str) -> Result<EmbeddedUiData, RpError> {
        let broker = self.broker()?;
        let client_id = self.client_id()?;
        let url = format!("{}{EMBEDDED_UI_PATH}/{client_id}?lang={lang}", broker.base_url);

        let started = Instant::now();
        let body = self
            .http
            .get_text(&url, &[("Content-Type", "application/json")])
            .await;
        record_broker_request(
            "embedded_ui",
            if body.is_ok() { "success" } else { "error" },
            started.elapsed(),
        );

        let body = body.map_err(|e| RpError::Internal(format!("Embedded UI fetch failed: {e}")))?;
        EmbeddedUiData::parse(&body).map_err(RpError::Internal)
    }

    fn broker(&self) -> Result<&BrokerEndpoints, RpError> {
        self.broker
            .as_ref()
            .ok_or_else(|| RpError::Configuration("ISB_HOST is not configured".to_string()))
    }

    fn client_id(&self) -> Result<&str, RpError> {
        self.client_id
            .as_deref()
            .ok_or_else(|| RpError::Configuration("CLIENT_ID is not configured".to_string()))
    }
}
