//! Broker signing key resolution.
//!
//! The broker publishes its ID token signing keys as a JWS at
//! `/jwks/broker-signed`, signed with its entity key. The relying party pins
//! that entity key and caches the verified key set until the document's
//! `exp`.
//!
//! # Cache states
//!
//! - **Fresh**: cached set with `now < expires_at`, served without I/O
//! - **Stale**: no set, or `now >= expires_at`; the next `resolve()` refreshes
//! - **Refreshing**: one task fetches and verifies; others wait on the
//!   refresh lock and then read the new set
//!
//! A failed refresh leaves the cache as it was and the current request
//! fails. A stale set is never used. Refresh is request-triggered only.

use crate::crypto::jws::{self, JwsError};
use crate::crypto::keys::TrustAnchor;
use crate::errors::RpError;
use crate::observability::metrics::{record_broker_key_refresh, record_broker_request};
use chrono::Utc;
use common::http::HttpClient;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Path of the broker's signed JWKS endpoint.
pub const BROKER_JWKS_PATH: &str = "/jwks/broker-signed";

/// Verified broker signing keys.
#[derive(Debug, Clone)]
pub struct BrokerKeySet {
    pub keys: JwkSet,
    /// Copied from the verified `exp` claim (epoch seconds).
    pub expires_at: i64,
}

impl BrokerKeySet {
    pub fn is_fresh(&self, now: i64) -> bool {
        now < self.expires_at
    }

    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.find(kid)
    }
}

#[derive(Debug, Deserialize)]
struct SignedJwksClaims {
    keys: Vec<Jwk>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    exp: i64,
}

/// Fetches, verifies and caches the broker key set.
pub struct BrokerKeyResolver {
    http: HttpClient,
    jwks_url: String,
    expected_issuer: String,
    cache: RwLock<Option<Arc<BrokerKeySet>>>,
    refresh_lock: Mutex<()>,
}

impl BrokerKeyResolver {
    /// # Arguments
    ///
    /// * `broker_base_url` - Outbound base URL of the broker
    /// * `broker_host` - Broker host name; the document must have
    ///   `iss == sub == https://{broker_host}`
    pub fn new(http: HttpClient, broker_base_url: &str, broker_host: &str) -> Self {
        Self {
            http,
            jwks_url: format!("{broker_base_url}{BROKER_JWKS_PATH}"),
            expected_issuer: format!("https://{broker_host}"),
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Return a fresh broker key set, refreshing it if needed.
    ///
    /// # Errors
    ///
    /// - `KeyResolution` - fetch, HTTP status, parse, signature or expiry failure
    /// - `TrustValidation` - `iss`/`sub` do not identify the broker
    #[instrument(skip_all)]
    pub async fn resolve(&self, anchor: &TrustAnchor) -> Result<Arc<BrokerKeySet>, RpError> {
        if let Some(set) = self.fresh_from_cache().await {
            tracing::debug!(target: "rp.broker_keys", "Broker key set cache hit");
            return Ok(set);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another task may have refreshed while this one waited
        if let Some(set) = self.fresh_from_cache().await {
            return Ok(set);
        }

        let result = self.refresh(anchor).await;
        record_broker_key_refresh(if result.is_ok() { "success" } else { "error" });
        result
    }

    /// The cached set, fresh or not.
    pub async fn cached(&self) -> Option<Arc<BrokerKeySet>> {
        self.cache.read().await.clone()
    }

    async fn fresh_from_cache(&self) -> Option<Arc<BrokerKeySet>> {
        let now = Utc::now().timestamp();
        let cache = self.cache.read().await;
        cache.as_ref().filter(|set| set.is_fresh(now)).cloned()
    }

    async fn refresh(&self, anchor: &TrustAnchor) -> Result<Arc<BrokerKeySet>, RpError> {
        tracing::debug!(target: "rp.broker_keys", url = %self.jwks_url, "Fetching broker JWKS");

        let started = Instant::now();
        let fetched = self
            .http
            .get_text(&self.jwks_url, &[("Content-Type", "application/jose")])
            .await;
        record_broker_request(
            "jwks",
            if fetched.is_ok() { "success" } else { "error" },
            started.elapsed(),
        );

        let document = fetched.map_err(|e| {
            tracing::error!(target: "rp.broker_keys", error = %e, "Reading broker signed JWKS failed");
            RpError::KeyResolution(format!("Broker JWKS fetch failed: {e}"))
        })?;

        let claims: SignedJwksClaims =
            jws::verify(document.trim(), anchor.decoding_key(), &jws::strict_validation())
                .map_err(|e| {
                    tracing::error!(
                        target: "rp.broker_keys",
                        error = %e,
                        anchor_kid = %anchor.kid(),
                        "Verifying broker signed JWKS failed"
                    );
                    match e {
                        JwsError::Compact(_) => {
                            RpError::KeyResolution(format!("Broker JWKS malformed: {e}"))
                        }
                        _ => RpError::KeyResolution(format!("Broker JWKS not verified: {e}")),
                    }
                })?;

        self.check_issuer(&claims)?;

        let set = Arc::new(BrokerKeySet {
            keys: JwkSet { keys: claims.keys },
            expires_at: claims.exp,
        });

        {
            let mut cache = self.cache.write().await;
            *cache = Some(Arc::clone(&set));
        }

        tracing::info!(
            target: "rp.broker_keys",
            key_count = set.keys.keys.len(),
            expires_at = set.expires_at,
            "Broker key set refreshed"
        );

        Ok(set)
    }

    fn check_issuer(&self, claims: &SignedJwksClaims) -> Result<(), RpError> {
        let (Some(iss), Some(sub)) = (claims.iss.as_deref(), claims.sub.as_deref()) else {
            tracing::error!(target: "rp.broker_keys", "Broker JWKS lacks iss or sub");
            return Err(RpError::TrustValidation("iss or sub missing".to_string()));
        };

        if iss != sub {
            tracing::error!(target: "rp.broker_keys", iss = %iss, sub = %sub, "ISS and SUB do not match");
            return Err(RpError::TrustValidation("iss and sub do not match".to_string()));
        }

        if iss != self.expected_issuer {
            tracing::error!(
                target: "rp.broker_keys",
                iss = %iss,
                expected = %self.expected_issuer,
                "ISS does not match broker host"
            );
            return Err(RpError::TrustValidation(
                "iss does not match broker host".to_string(),
            ));
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn seed(&self, set: BrokerKeySet) {
        *self.cache.write().await = Some(Arc::new(set));
    }
}
