//! In-memory sessions keyed by a random cookie.
//!
//! The cookie carries only a UUID v4. Everything else (flow state, nonce,
//! verified profile, last error) stays server-side in [`SessionStore`].
//! Cookies use `SameSite=Lax` so the top-level redirect back from the broker
//! to `/oauth/code` still carries them.
//!
//! The store is bounded: expired entries are pruned when a session is
//! created, and past `max_entries` the least recently seen one is evicted.

use crate::config::DEFAULT_SESSION_MAX_ENTRIES;
use crate::services::id_token::VerifiedClaims;
use axum::http::{header::COOKIE, HeaderMap};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

pub const SESSION_COOKIE_NAME: &str = "rp_session";

/// Cookie max age in seconds (24 hours).
pub const SESSION_COOKIE_MAX_AGE: u64 = 86_400;

/// Which view the user came from; `/oauth/code` and `/logout` return there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    Embedded,
    Normal,
}

impl ViewMode {
    pub fn home_path(self) -> &'static str {
        match self {
            ViewMode::Normal => "/",
            ViewMode::Embedded => "/embedded",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub lang: Option<String>,
    pub profile: Option<VerifiedClaims>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub mode: ViewMode,
}

impl SessionData {
    /// Forget the pending authorization attempt.
    pub fn clear_flow(&mut self) {
        self.state = None;
        self.nonce = None;
    }

    pub fn clear_error(&mut self) {
        self.error = None;
        self.error_description = None;
    }
}

struct Entry {
    data: SessionData,
    last_seen: Instant,
}

/// A session id resolved for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: Uuid,
    /// The id was minted for this request and the cookie must be set.
    pub is_new: bool,
}

/// Process-local session store.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Entry>>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(SESSION_COOKIE_MAX_AGE),
            DEFAULT_SESSION_MAX_ENTRIES,
        )
    }
}

impl SessionStore {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Use the cookie's session if the store knows it; otherwise mint a new id.
    ///
    /// Unknown ids are never adopted, so a client cannot choose its own id.
    pub async fn resolve(&self, headers: &HeaderMap) -> SessionHandle {
        if let Some(id) = extract_session_cookie(headers) {
            let sessions = self.sessions.read().await;
            if sessions
                .get(&id)
                .is_some_and(|entry| entry.last_seen.elapsed() < self.ttl)
            {
                return SessionHandle { id, is_new: false };
            }
        }

        SessionHandle {
            id: Uuid::new_v4(),
            is_new: true,
        }
    }

    /// Snapshot of a session; empty data for unknown ids.
    pub async fn get(&self, id: Uuid) -> SessionData {
        self.sessions
            .read()
            .await
            .get(&id)
            .filter(|entry| entry.last_seen.elapsed() < self.ttl)
            .map(|entry| entry.data.clone())
            .unwrap_or_default()
    }

    /// Apply `f` to the session, creating it when missing.
    pub async fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut SessionData) -> R) -> R {
        let mut sessions = self.sessions.write().await;
        let ttl = self.ttl;

        if !sessions.contains_key(&id) {
            sessions.retain(|_, entry| entry.last_seen.elapsed() < ttl);

            while sessions.len() >= self.max_entries {
                let Some(oldest) = sessions
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_seen)
                    .map(|(id, _)| *id)
                else {
                    break;
                };
                sessions.remove(&oldest);
                tracing::debug!(target: "rp.session", "Session store full, evicted oldest entry");
            }
        }

        let entry = sessions.entry(id).or_insert_with(|| Entry {
            data: SessionData::default(),
            last_seen: Instant::now(),
        });
        if entry.last_seen.elapsed() >= ttl {
            entry.data = SessionData::default();
        }
        entry.last_seen = Instant::now();
        f(&mut entry.data)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// `Set-Cookie` value for a new session.
#[must_use]
pub fn create_session_cookie(session_id: Uuid, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "{SESSION_COOKIE_NAME}={session_id}; HttpOnly{secure_flag}; SameSite=Lax; Path=/; Max-Age={SESSION_COOKIE_MAX_AGE}"
    )
}

/// Session id from the `Cookie` header, if present and well-formed.
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|part| {
            part.trim()
                .strip_prefix(SESSION_COOKIE_NAME)
                .and_then(|rest| rest.strip_prefix('='))
                .and_then(|value| Uuid::parse_str(value.trim()).ok())
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_create_session_cookie() {
        let id = Uuid::new_v4();

        let cookie = create_session_cookie(id, true);
        assert!(cookie.starts_with(&format!("rp_session={id};")));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("; Secure"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/;"));

        assert!(!create_session_cookie(id, false).contains("Secure"));
    }

    #[test]
    fn test_extract_session_cookie() {
        let id = Uuid::new_v4();

        let headers = headers_with_cookie(&format!("theme=dark; rp_session={id}; other=1"));
        assert_eq!(extract_session_cookie(&headers), Some(id));

        assert_eq!(extract_session_cookie(&headers_with_cookie("rp_session=junk")), None);
        assert_eq!(
            extract_session_cookie(&headers_with_cookie(&format!("rp_session_old={id}"))),
            None
        );
        assert_eq!(extract_session_cookie(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_unknown_cookie_gets_new_id() {
        let store = SessionStore::default();
        let chosen = Uuid::new_v4();

        let handle = store
            .resolve(&headers_with_cookie(&format!("rp_session={chosen}")))
            .await;

        assert!(handle.is_new);
        assert_ne!(handle.id, chosen);
    }

    #[tokio::test]
    async fn test_known_cookie_is_reused() {
        let store = SessionStore::default();
        let id = Uuid::new_v4();
        store.update(id, |s| s.lang = Some("fi".to_string())).await;

        let handle = store
            .resolve(&headers_with_cookie(&format!("rp_session={id}")))
            .await;

        assert_eq!(handle, SessionHandle { id, is_new: false });
        assert_eq!(store.get(id).await.lang.as_deref(), Some("fi"));
    }

    #[tokio::test]
    async fn test_expired_sessions_are_dropped() {
        let store = SessionStore::new(Duration::ZERO, DEFAULT_SESSION_MAX_ENTRIES);
        let id = Uuid::new_v4();
        store.update(id, |s| s.state = Some("s".to_string())).await;

        assert!(store.get(id).await.state.is_none());
        let handle = store
            .resolve(&headers_with_cookie(&format!("rp_session={id}")))
            .await;
        assert!(handle.is_new);

        store.update(Uuid::new_v4(), |_| ()).await;
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_store_is_bounded_and_evicts_oldest() {
        let store = SessionStore::new(Duration::from_secs(60), 3);
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();

        for id in &ids {
            store.update(*id, |s| s.lang = Some("fi".to_string())).await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert_eq!(store.len().await, 3);
        assert!(store.get(ids[0]).await.lang.is_none());
        assert!(store.get(ids[1]).await.lang.is_none());
        assert_eq!(store.get(ids[4]).await.lang.as_deref(), Some("fi"));
    }

    #[tokio::test]
    async fn test_updating_known_session_does_not_evict() {
        let store = SessionStore::new(Duration::from_secs(60), 2);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store.update(first, |s| s.lang = Some("fi".to_string())).await;
        store.update(second, |s| s.lang = Some("sv".to_string())).await;

        store.update(first, |s| s.lang = Some("en".to_string())).await;

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get(second).await.lang.as_deref(), Some("sv"));
    }

    #[test]
    fn test_home_path() {
        assert_eq!(ViewMode::Normal.home_path(), "/");
        assert_eq!(ViewMode::Embedded.home_path(), "/embedded");
        assert_eq!(ViewMode::default(), ViewMode::Embedded);
    }

    #[test]
    fn test_clear_flow_keeps_profile_fields() {
        let mut data = SessionData {
            state: Some("s".to_string()),
            nonce: Some("n".to_string()),
            lang: Some("en".to_string()),
            error: Some("e".to_string()),
            ..Default::default()
        };

        data.clear_flow();
        assert!(data.state.is_none());
        assert!(data.nonce.is_none());
        assert_eq!(data.lang.as_deref(), Some("en"));
        assert_eq!(data.error.as_deref(), Some("e"));
    }
}
