//! Federation trust documents.
//!
//! - `GET /signed-jwks` - `application/jwk-set+jwt`
//! - `GET /.well-known/openid-federation` - `application/entity-statement+jwt`
//!
//! Issuer and subject come from the request's `Host` header, so one
//! deployment can answer for every name it is reachable under.

use super::request_host;
use crate::routes::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

pub const SIGNED_JWKS_CONTENT_TYPE: &str = "application/jwk-set+jwt";
pub const ENTITY_STATEMENT_CONTENT_TYPE: &str = "application/entity-statement+jwt";

/// Handler for GET /signed-jwks
#[instrument(skip_all, name = "rp.documents.signed_jwks")]
pub async fn signed_jwks(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let host = match request_host(&headers) {
        Ok(host) => host,
        Err(response) => return response,
    };

    match state.pipeline.signed_jwks_document(host) {
        Ok(document) => ([(header::CONTENT_TYPE, SIGNED_JWKS_CONTENT_TYPE)], document).into_response(),
        Err(e) => {
            e.log("signed_jwks");
            e.into_response()
        }
    }
}

/// Handler for GET /.well-known/openid-federation
#[instrument(skip_all, name = "rp.documents.entity_statement")]
pub async fn entity_statement(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let host = match request_host(&headers) {
        Ok(host) => host,
        Err(response) => return response,
    };

    match state.pipeline.entity_statement_document(host) {
        Ok(document) => {
            ([(header::CONTENT_TYPE, ENTITY_STATEMENT_CONTENT_TYPE)], document).into_response()
        }
        Err(e) => {
            e.log("entity_statement");
            e.into_response()
        }
    }
}

/// Handler for GET /robots.txt
pub async fn robots_txt() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain")],
        "User-agent: *\nDisallow: /\n",
    )
}
