//! HTTP routes for the relying party.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::crypto::keys::KeyStore;
use crate::errors::RpError;
use crate::handlers;
use crate::services::TrustPipeline;
use crate::session::{SessionStore, SESSION_COOKIE_MAX_AGE};
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Token-trust pipeline (keys, broker key cache, HTTP client).
    pub pipeline: TrustPipeline,

    /// In-memory sessions.
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config, keys: KeyStore) -> Result<Self, RpError> {
        let pipeline = TrustPipeline::new(&config, keys)?;
        let sessions = SessionStore::new(
            Duration::from_secs(SESSION_COOKIE_MAX_AGE),
            config.session_max_entries,
        );
        Ok(Self {
            config,
            pipeline,
            sessions,
        })
    }
}

/// Build the application routes.
///
/// - `/` and `/embedded` - views
/// - `/oauth/authorize`, `/oauth/code`, `/logout` - identification flow
/// - `/signed-jwks`, `/.well-known/openid-federation` - trust documents
/// - `/metrics` - Prometheus scrape endpoint
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let app_routes = Router::new()
        .route("/", get(handlers::hosted_view))
        .route("/embedded", get(handlers::embedded_view))
        .route("/oauth/authorize", get(handlers::authorize))
        .route("/oauth/code", get(handlers::code))
        .route("/logout", get(handlers::logout))
        .route("/signed-jwks", get(handlers::signed_jwks))
        .route(
            "/.well-known/openid-federation",
            get(handlers::entity_statement),
        )
        .route("/robots.txt", get(handlers::robots_txt))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    app_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPems;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use common::secret::SecretString;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use rp_test_utils::crypto_fixtures::*;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn app(keys: KeyStore) -> Router {
        app_with_state(keys, &[]).0
    }

    fn app_with_state(keys: KeyStore, extra: &[(&str, &str)]) -> (Router, Arc<AppState>) {
        let mut vars = HashMap::from([
            ("ISB_HOST".to_string(), "isb.test".to_string()),
            ("CLIENT_ID".to_string(), "saippua-client".to_string()),
        ]);
        for (name, value) in extra {
            vars.insert((*name).to_string(), (*value).to_string());
        }
        let config = Config::from_vars(&vars).unwrap();
        let state = Arc::new(AppState::new(config, keys).unwrap());
        let handle = PrometheusBuilder::new().build_recorder().handle();
        (build_routes(Arc::clone(&state), handle), state)
    }

    fn fixture_keys() -> KeyStore {
        KeyStore::from_pems(&KeyPems {
            signing: SecretString::from(SP_SIGNING_KEY_PEM),
            encryption: SecretString::from(SP_ENCRYPTION_KEY_PEM),
            entity: SecretString::from(SP_ENTITY_KEY_PEM),
            broker_entity_public: BROKER_ENTITY_PUBLIC_KEY_PEM.to_string(),
        })
        .unwrap()
    }

    fn get(uri: &str, host: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(host) = host {
            builder = builder.header(header::HOST, host);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_signed_jwks_content_type() {
        let response = app(fixture_keys())
            .oneshot(get("/signed-jwks", Some("rp.example.fi")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/jwk-set+jwt"
        );
    }

    #[tokio::test]
    async fn test_entity_statement_content_type() {
        let response = app(fixture_keys())
            .oneshot(get("/.well-known/openid-federation", Some("rp.example.fi")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/entity-statement+jwt"
        );
    }

    #[tokio::test]
    async fn test_documents_fail_closed_without_keys() {
        let keys = KeyStore::Unavailable {
            reason: "sp-signing-key.pem missing".to_string(),
        };
        let response = app(keys)
            .oneshot(get("/signed-jwks", Some("rp.example.fi")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_invalid_host_rejected() {
        let response = app(fixture_keys())
            .oneshot(get("/signed-jwks", Some("evil.example/path")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_authorize_redirects_and_sets_cookie() {
        let response = app(fixture_keys())
            .oneshot(get("/oauth/authorize?purpose=strong", Some("rp.example.fi")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://isb.test/oauth/authorize?request="));

        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("rp_session="));
        assert!(cookie.contains("SameSite=Lax"));
    }

    #[tokio::test]
    async fn test_code_without_session_state_redirects_home() {
        let response = app(fixture_keys())
            .oneshot(get("/oauth/code?code=abc&state=forged", Some("rp.example.fi")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/embedded");
    }

    #[tokio::test]
    async fn test_code_without_cookie_sets_cookie_for_stored_error() {
        let (app, state) = app_with_state(fixture_keys(), &[]);

        let response = app
            .oneshot(get("/oauth/code?code=y&state=x", Some("rp.example.fi")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("rp_session="));
        assert_eq!(state.sessions.len().await, 1);
    }

    #[tokio::test]
    async fn test_cookieless_requests_cannot_grow_sessions_past_limit() {
        let (app, state) = app_with_state(fixture_keys(), &[("SESSION_MAX_ENTRIES", "50")]);

        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(get("/", Some("rp.example.fi")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(state.sessions.len().await, 50);
    }

    #[tokio::test]
    async fn test_robots_txt() {
        let response = app(fixture_keys())
            .oneshot(get("/robots.txt", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"User-agent: *\nDisallow: /\n");
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let response = app(fixture_keys()).oneshot(get("/metrics", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
