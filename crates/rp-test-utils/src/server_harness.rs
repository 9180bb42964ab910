//! Test server harness for E2E testing
//!
//! Provides `TestRpServer` for spawning real relying party instances wired
//! to a [`MockBroker`].

use crate::broker_mock::{MockBroker, BROKER_HOST, TEST_CLIENT_ID};
use crate::crypto_fixtures::{
    BROKER_ENTITY_PUBLIC_KEY_PEM, SP_ENCRYPTION_KEY_PEM, SP_ENTITY_KEY_PEM, SP_SIGNING_KEY_PEM,
};
use common::secret::SecretString;
use metrics_exporter_prometheus::PrometheusBuilder;
use rp_service::config::Config;
use rp_service::crypto::keys::{KeyPems, KeyStore};
use rp_service::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Key store built from the fixture keys.
pub fn fixture_key_store() -> KeyStore {
    KeyStore::from_pems(&KeyPems {
        signing: SecretString::from(SP_SIGNING_KEY_PEM),
        encryption: SecretString::from(SP_ENCRYPTION_KEY_PEM),
        entity: SecretString::from(SP_ENTITY_KEY_PEM),
        broker_entity_public: BROKER_ENTITY_PUBLIC_KEY_PEM.to_string(),
    })
    .expect("fixture keys should load")
}

/// Test harness for spawning the relying party in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_signed_jwks_e2e() -> Result<(), anyhow::Error> {
///     let broker = MockBroker::start().await;
///     let server = TestRpServer::spawn(&broker).await?;
///
///     let response = server.client()?
///         .get(format!("{}/signed-jwks", server.url()))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestRpServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestRpServer {
    /// Spawn a server that talks to `broker` with the fixture keys.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Use `ISB_HOST=isb.test` with outbound calls going to the mock
    /// - Build `redirect_uri` with `http` and set non-`Secure` cookies
    pub async fn spawn(broker: &MockBroker) -> Result<Self, anyhow::Error> {
        Self::spawn_with(broker, &[], fixture_key_store()).await
    }

    /// Spawn with extra configuration variables and a chosen key store.
    pub async fn spawn_with(
        broker: &MockBroker,
        overrides: &[(&str, &str)],
        keys: KeyStore,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("ISB_HOST".to_string(), BROKER_HOST.to_string()),
            ("ISB_BASE_URL".to_string(), broker.uri()),
            ("CLIENT_ID".to_string(), TEST_CLIENT_ID.to_string()),
            ("PUBLIC_SCHEME".to_string(), "http".to_string()),
            ("SESSION_COOKIE_SECURE".to_string(), "false".to_string()),
            (
                "SPNAME".to_string(),
                r#"{"en":"Soap for the people","fi":"Saippuaa kansalle"}"#.to_string(),
            ),
        ]);
        for (name, value) in overrides {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(
            AppState::new(config, keys)
                .map_err(|e| anyhow::anyhow!("Failed to create app state: {}", e))?,
        );

        // Recorder is not installed globally; several servers may run per process
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(Arc::clone(&state), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared application state (sessions, pipeline, config).
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// A browser-like client: keeps cookies, does not follow redirects.
    pub fn client(&self) -> Result<reqwest::Client, anyhow::Error> {
        reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build client: {}", e))
    }
}

impl Drop for TestRpServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
