//! OAuth handlers.
//!
//! - `GET /oauth/authorize` - start an identification, redirect to the broker
//! - `GET /oauth/code` - broker callback, exchange and verify the ID token
//! - `GET /logout` - forget the identity and return to the current view
//!
//! Every outcome ends in a redirect. Failures are logged with detail and
//! stored in the session as a generic message for the next view.

use super::{request_host, with_session_cookie};
use crate::errors::{RpError, GENERIC_FAILURE_MESSAGE};
use crate::routes::AppState;
use crate::services::authorization::{AuthRequestContext, AuthorizationOptions, Purpose};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

/// Broker-supplied error texts longer than this are cut.
const MAX_BROKER_ERROR_LEN: usize = 256;

/// Broker error that means the user backed out; not shown as an error.
const CANCEL_ERROR: &str = "cancel";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeQuery {
    pub prompt_box: Option<String>,
    pub id_button: Option<String>,
    pub purpose: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct CodeQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Handler for GET /oauth/authorize
///
/// Creates a fresh `state` and `nonce`, stores them in the session and
/// redirects to `https://{ISB_HOST}/oauth/authorize?request={JWS}`.
#[instrument(skip_all, name = "rp.oauth.authorize")]
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let host = match request_host(&headers) {
        Ok(host) => host,
        Err(response) => return response,
    };
    let redirect_uri = redirect_uri(&state, host);
    let session = state.sessions.resolve(&headers).await;
    let current = state.sessions.get(session.id).await;

    let options = AuthorizationOptions {
        language: current.lang,
        prompt_consent: query.prompt_box.is_some_and(|v| !v.is_empty()),
        idp_hint: query.id_button.filter(|v| !v.is_empty()),
        purpose: query.purpose.as_deref().and_then(Purpose::from_query),
    };

    let result = AuthRequestContext::new(options).and_then(|context| {
        let url = state.pipeline.authorization_redirect(&context, &redirect_uri)?;
        Ok((context, url))
    });

    let response = match result {
        Ok((context, url)) => {
            state
                .sessions
                .update(session.id, |s| {
                    s.state = Some(context.state);
                    s.nonce = Some(context.nonce);
                })
                .await;
            tracing::debug!(target: "rp.oauth", "Redirecting to broker");
            Redirect::to(&url).into_response()
        }
        Err(e) => {
            e.log("authorize");
            let mode = state
                .sessions
                .update(session.id, |s| {
                    s.clear_flow();
                    s.error = Some(GENERIC_FAILURE_MESSAGE.to_string());
                    s.mode
                })
                .await;
            Redirect::to(mode.home_path()).into_response()
        }
    };

    with_session_cookie(response, session, state.config.session_cookie_secure)
}

/// Handler for GET /oauth/code
///
/// Order of checks: `state` against the session, broker `error`, then the
/// token exchange. `state` and `nonce` are consumed whatever the outcome.
#[instrument(skip_all, name = "rp.oauth.code")]
pub async fn code(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CodeQuery>,
) -> Response {
    let host = match request_host(&headers) {
        Ok(host) => host,
        Err(response) => return response,
    };
    let redirect_uri = redirect_uri(&state, host);
    let session = state.sessions.resolve(&headers).await;
    let secure = state.config.session_cookie_secure;

    let (mode, expected_state, expected_nonce) = state
        .sessions
        .update(session.id, |s| (s.mode, s.state.take(), s.nonce.take()))
        .await;
    let home = Redirect::to(mode.home_path()).into_response();

    let state_matches = matches!(
        (query.state.as_deref(), expected_state.as_deref()),
        (Some(received), Some(expected)) if received == expected
    );
    if !state_matches {
        RpError::StateMismatch.log("code");
        store_error(&state, session.id, GENERIC_FAILURE_MESSAGE.to_string(), None).await;
        return with_session_cookie(home, session, secure);
    }

    if let Some(error) = query.error {
        tracing::warn!(
            target: "rp.oauth",
            error = %truncate(&error),
            "Broker returned an error"
        );
        if error != CANCEL_ERROR {
            store_error(
                &state,
                session.id,
                truncate(&error),
                query.error_description.as_deref().map(truncate),
            )
            .await;
        }
        return with_session_cookie(home, session, secure);
    }

    let outcome = match (query.code.as_deref(), expected_nonce.as_deref()) {
        (Some(code), Some(nonce)) if !code.is_empty() => {
            state
                .pipeline
                .exchange_and_verify_id_token(code, &redirect_uri, nonce)
                .await
        }
        (_, None) => Err(RpError::NonceMismatch),
        _ => Err(RpError::TokenExchange(
            "Authorization code missing".to_string(),
        )),
    };

    match outcome {
        Ok(claims) => {
            state
                .sessions
                .update(session.id, |s| {
                    s.profile = Some(claims);
                    s.clear_error();
                })
                .await;
        }
        Err(e) => {
            e.log("code");
            state
                .sessions
                .update(session.id, |s| {
                    s.profile = None;
                    s.error = Some(GENERIC_FAILURE_MESSAGE.to_string());
                    s.error_description = None;
                })
                .await;
        }
    }

    with_session_cookie(home, session, secure)
}

/// Handler for GET /logout
#[instrument(skip_all, name = "rp.oauth.logout")]
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session = state.sessions.resolve(&headers).await;
    if session.is_new {
        return Redirect::to(crate::session::ViewMode::default().home_path()).into_response();
    }

    let mode = state
        .sessions
        .update(session.id, |s| {
            s.profile = None;
            s.clear_error();
            s.lang = None;
            s.clear_flow();
            s.mode
        })
        .await;

    tracing::debug!(target: "rp.oauth", "Session cleared");
    Redirect::to(mode.home_path()).into_response()
}

fn redirect_uri(state: &AppState, host: &str) -> String {
    format!("{}://{host}/oauth/code", state.config.public_scheme)
}

async fn store_error(
    state: &AppState,
    session_id: uuid::Uuid,
    error: String,
    description: Option<String>,
) {
    state
        .sessions
        .update(session_id, |s| {
            s.error = Some(error);
            s.error_description = description;
        })
        .await;
}

fn truncate(value: &str) -> String {
    value.chars().take(MAX_BROKER_ERROR_LEN).collect()
}
