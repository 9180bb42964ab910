//! HTTP request handlers for the relying party.

pub mod documents_handler;
pub mod metrics_handler;
pub mod oauth_handler;
pub mod profile_handler;

pub use documents_handler::{entity_statement, robots_txt, signed_jwks};
pub use metrics_handler::metrics_handler;
pub use oauth_handler::{authorize, code, logout};
pub use profile_handler::{embedded_view, hosted_view};

use crate::services::trust_documents::validate_host;
use crate::session::{create_session_cookie, SessionHandle};
use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

/// The request's `Host` header, validated for use in URLs.
#[allow(clippy::result_large_err)]
fn request_host(headers: &HeaderMap) -> Result<&str, Response> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| validate_host(host).is_ok());

    host.ok_or_else(|| {
        tracing::warn!(target: "rp.http", "Missing or invalid Host header");
        (StatusCode::BAD_REQUEST, "Invalid Host header").into_response()
    })
}

/// Attach `Set-Cookie` when the session was created by this request.
fn with_session_cookie(mut response: Response, session: SessionHandle, secure: bool) -> Response {
    if session.is_new {
        if let Ok(value) = HeaderValue::from_str(&create_session_cookie(session.id, secure)) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}
