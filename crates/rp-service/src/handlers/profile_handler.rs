//! Landing and profile views.
//!
//! - `GET /` - hosted view
//! - `GET /embedded` - embedded view with the broker's identification wall
//!
//! Both answer with JSON: the verified profile, the last error (shown once)
//! and the authentication time in Helsinki time.

use super::with_session_cookie;
use crate::routes::AppState;
use crate::services::embedded_ui::EmbeddedUiData;
use crate::services::id_token::VerifiedClaims;
use crate::session::{SessionData, ViewMode};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use chrono::DateTime;
use chrono_tz::Europe::Helsinki;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

pub const DEFAULT_LANGUAGE: &str = "en";

/// Shown when the identification wall data cannot be fetched or validated.
pub const EMBEDDED_UI_ERROR: &str = "Embedded identification wall could not be formed";

const MAX_LANGUAGE_LEN: usize = 8;

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    pub lang: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub hosted: bool,
    pub embedded: bool,
    pub landing: bool,
    pub lang: String,
    pub profile: Option<VerifiedClaims>,
    pub raw_profile: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub auth_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_info: Option<EmbeddedUiData>,
    pub return_url: &'static str,
}

/// Handler for GET /
#[instrument(skip_all, name = "rp.view.hosted")]
pub async fn hosted_view(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ViewQuery>,
) -> Response {
    let session = state.sessions.resolve(&headers).await;
    let lang = normalize_language(query.lang.as_deref());

    let snapshot = enter_view(&state, session.id, ViewMode::Normal, &lang).await;
    let view = build_view(snapshot, ViewMode::Normal, lang, None);

    with_session_cookie(
        Json(view).into_response(),
        session,
        state.config.session_cookie_secure,
    )
}

/// Handler for GET /embedded
///
/// Without a profile or a pending error the identification wall is fetched
/// from the broker.
#[instrument(skip_all, name = "rp.view.embedded")]
pub async fn embedded_view(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ViewQuery>,
) -> Response {
    let session = state.sessions.resolve(&headers).await;
    let lang = normalize_language(query.lang.as_deref());

    let mut snapshot = enter_view(&state, session.id, ViewMode::Embedded, &lang).await;

    let mut embedded_info = None;
    if snapshot.profile.is_none() && snapshot.error.is_none() {
        match state.pipeline.fetch_embedded_ui(&lang).await {
            Ok(data) => embedded_info = Some(data),
            Err(e) => {
                tracing::warn!(target: "rp.http", error = %e, "Identification wall unavailable");
                snapshot.error = Some(EMBEDDED_UI_ERROR.to_string());
                snapshot.error_description = None;
            }
        }
    }

    let view = build_view(snapshot, ViewMode::Embedded, lang, embedded_info);

    with_session_cookie(
        Json(view).into_response(),
        session,
        state.config.session_cookie_secure,
    )
}

/// Switch the session to `mode`, take the pending error and drop any
/// unfinished authorization. Returns the session as it was before.
async fn enter_view(
    state: &AppState,
    session_id: uuid::Uuid,
    mode: ViewMode,
    lang: &str,
) -> SessionData {
    state
        .sessions
        .update(session_id, |s| {
            let snapshot = s.clone();
            s.clear_error();
            s.clear_flow();
            s.mode = mode;
            s.lang = Some(lang.to_string());
            snapshot
        })
        .await
}

fn build_view(
    session: SessionData,
    mode: ViewMode,
    lang: String,
    embedded_info: Option<EmbeddedUiData>,
) -> ProfileView {
    let raw_profile = session
        .profile
        .as_ref()
        .and_then(|profile| serde_json::to_string_pretty(profile).ok());
    let auth_time = session
        .profile
        .as_ref()
        .and_then(|profile| profile.auth_time)
        .and_then(format_auth_time);

    ProfileView {
        hosted: mode == ViewMode::Normal,
        embedded: mode == ViewMode::Embedded,
        landing: session.profile.is_none() && session.error.is_none(),
        lang,
        profile: session.profile,
        raw_profile,
        error: session.error,
        error_description: session.error_description,
        auth_time,
        embedded_info,
        return_url: mode.home_path(),
    }
}

/// Format an `auth_time` (epoch seconds) as e.g. `November 15, 12:13 AM`
/// in Helsinki time.
pub fn format_auth_time(epoch_seconds: i64) -> Option<String> {
    let utc = DateTime::from_timestamp(epoch_seconds, 0)?;
    Some(
        utc.with_timezone(&Helsinki)
            .format("%B %-d, %-I:%M %p")
            .to_string(),
    )
}

/// Accept short language tags (`fi`, `sv`, `en-GB`); anything else means English.
pub fn normalize_language(lang: Option<&str>) -> String {
    match lang {
        Some(lang)
            if !lang.is_empty()
                && lang.len() <= MAX_LANGUAGE_LEN
                && lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') =>
        {
            lang.to_string()
        }
        _ => DEFAULT_LANGUAGE.to_string(),
    }
}
