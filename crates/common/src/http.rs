//! Outbound HTTP client for identity broker endpoints.
//!
//! Thin wrapper around `reqwest` used for the broker's token endpoint, its
//! signed JWKS endpoint and the embedded-UI endpoint.
//!
//! # Behavior
//!
//! - Every request carries a fixed timeout; on expiry the connection is
//!   dropped and [`HttpError::Timeout`] is returned
//! - Redirects are never followed; a 3xx is reported like any other
//!   unexpected status
//! - HTTP 404, other statuses >= 300, transport failures, timeouts and body
//!   parse failures are distinct error variants
//! - No retries; callers decide what a failure means for their flow
//!
//! # Example
//!
//! ```rust,ignore
//! use common::http::HttpClient;
//! use std::time::Duration;
//!
//! let client = HttpClient::new(Duration::from_secs(5))?;
//! let body = client
//!     .get_text("https://isb.example/jwks/broker-signed", &[("Content-Type", "application/jose")])
//!     .await?;
//! ```

use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};

// =============================================================================
// Constants
// =============================================================================

/// Default timeout for broker requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Error Types
// =============================================================================

/// Errors returned by [`HttpClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// The endpoint answered 404.
    #[error("Resource not found")]
    NotFound,

    /// The endpoint answered with another status >= 300.
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection, TLS or protocol failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body could not be parsed.
    #[error("Invalid response body: {0}")]
    Parse(String),

    /// The client or URL is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl HttpError {
    fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            HttpError::Timeout
        } else {
            HttpError::Transport(e.to_string())
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client with a fixed per-request timeout.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    /// Build a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Configuration` if the underlying client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| HttpError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { inner, timeout })
    }

    /// The per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` and return the raw response body.
    ///
    /// # Errors
    ///
    /// See [`HttpError`].
    #[instrument(skip_all, fields(url = %url))]
    pub async fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, HttpError> {
        check_scheme(url)?;

        let mut request = self.inner.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            warn!(target: "common.http", error = %e, "Outbound GET failed");
            HttpError::from_reqwest(&e)
        })?;

        let body = read_body(response, "GET").await?;
        debug!(
            target: "common.http",
            elapsed_ms = started.elapsed().as_millis(),
            body_len = body.len(),
            "Outbound GET completed"
        );
        Ok(body)
    }

    /// GET `url` and parse the body as JSON.
    ///
    /// # Errors
    ///
    /// See [`HttpError`]; a body that is not valid JSON for `T` yields
    /// `HttpError::Parse`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<T, HttpError> {
        let body = self.get_text(url, headers).await?;
        parse_json(&body)
    }

    /// POST `form` as `application/x-www-form-urlencoded` and parse the JSON reply.
    ///
    /// Form values are never logged; they routinely carry authorization codes
    /// and client assertions.
    ///
    /// # Errors
    ///
    /// See [`HttpError`].
    #[instrument(skip_all, fields(url = %url))]
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> Result<T, HttpError> {
        check_scheme(url)?;

        let mut request = self.inner.post(url).form(form);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            warn!(target: "common.http", error = %e, "Outbound POST failed");
            HttpError::from_reqwest(&e)
        })?;

        let body = read_body(response, "POST").await?;
        debug!(
            target: "common.http",
            elapsed_ms = started.elapsed().as_millis(),
            "Outbound POST completed"
        );
        parse_json(&body)
    }
}

fn check_scheme(url: &str) -> Result<(), HttpError> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(HttpError::Configuration(
            "Unsupported endpoint protocol".to_string(),
        ))
    }
}

async fn read_body(response: reqwest::Response, method: &'static str) -> Result<String, HttpError> {
    let status = response.status();

    if status == reqwest::StatusCode::NOT_FOUND {
        debug!(target: "common.http", method, "Outbound request: not found");
        return Err(HttpError::NotFound);
    }

    if status.as_u16() >= 300 {
        warn!(
            target: "common.http",
            method,
            status = %status,
            "Outbound request returned error status"
        );
        return Err(HttpError::Status(status.as_u16()));
    }

    response.text().await.map_err(|e| {
        warn!(target: "common.http", method, error = %e, "Failed to read response body");
        HttpError::from_reqwest(&e)
    })
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, HttpError> {
    serde_json::from_str(body).map_err(|e| {
        warn!(target: "common.http", error = %e, "Response body is not valid JSON");
        HttpError::Parse(e.to_string())
    })
}

// =============================================================================
// Tests
// =============================================================================
