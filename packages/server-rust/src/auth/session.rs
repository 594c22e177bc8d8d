//! Session-cookie authentication.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use gatehouse_core::{AuthFailure, AuthInfo};
use http::header::COOKIE;
use http::request::Parts;
use http::HeaderMap;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::principal::load_principal;
use super::resolver::Authenticator;
use crate::traits::{PrincipalStore, SessionStore};

/// A server-side session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub expires_at: SystemTime,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

// ---------------------------------------------------------------------------
// SessionCookieAuthenticator
// ---------------------------------------------------------------------------

/// Authenticates requests by the session token found in a named cookie.
pub struct SessionCookieAuthenticator {
    tenant_id: String,
    cookie_name: String,
    sessions: Arc<dyn SessionStore>,
    principals: Arc<dyn PrincipalStore>,
}

impl SessionCookieAuthenticator {
    pub fn new(
        tenant_id: impl Into<String>,
        cookie_name: impl Into<String>,
        sessions: Arc<dyn SessionStore>,
        principals: Arc<dyn PrincipalStore>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            cookie_name: cookie_name.into(),
            sessions,
            principals,
        }
    }
}

#[async_trait]
impl Authenticator for SessionCookieAuthenticator {
    async fn authenticate(&self, request: &Parts) -> Result<Option<AuthInfo>, AuthFailure> {
        let Some(token) = find_cookie(&request.headers, &self.cookie_name) else {
            return Ok(None);
        };

        let session = match self.sessions.get_session(&self.tenant_id, token).await {
            Ok(Some(session)) => session,
            Ok(None) => return Err(AuthFailure::InvalidCredentials),
            Err(err) => {
                warn!(tenant = %self.tenant_id, error = %err, "session store lookup failed");
                return Err(AuthFailure::StoreUnavailable(err.to_string()));
            }
        };
        if session.is_expired(SystemTime::now()) {
            return Err(AuthFailure::Expired);
        }

        load_principal(self.principals.as_ref(), &self.tenant_id, &session.user_id)
            .await
            .map(Some)
    }
}

fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name && !value.is_empty()).then_some(value)
        })
}

// ---------------------------------------------------------------------------
// InMemorySessionStore
// ---------------------------------------------------------------------------

/// Session store held in memory. Only token digests are kept as keys.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<(String, String), Session>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session for `user_id` and returns its freshly generated token.
    pub fn create(&self, tenant_id: &str, user_id: impl Into<String>, ttl: Duration) -> String {
        let token = hex::encode(rand::random::<[u8; 32]>());
        self.insert(
            tenant_id,
            &token,
            Session {
                user_id: user_id.into(),
                expires_at: SystemTime::now() + ttl,
            },
        );
        token
    }

    pub fn insert(&self, tenant_id: &str, token: &str, session: Session) {
        self.sessions
            .insert((tenant_id.to_string(), token_digest(token)), session);
    }

    /// Revokes a session. Returns whether it existed.
    pub fn revoke(&self, tenant_id: &str, token: &str) -> bool {
        self.sessions
            .remove(&(tenant_id.to_string(), token_digest(token)))
            .is_some()
    }

    /// Drops every expired session.
    pub fn purge_expired(&self) {
        let now = SystemTime::now();
        self.sessions.retain(|_, session| !session.is_expired(now));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// One entry of a session seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRecord {
    pub tenant_id: String,
    pub token: String,
    pub user_id: String,
    /// Lifetime counted from load time.
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_session_ttl_secs() -> u64 {
    86_400
}

/// Reads a JSON array of [`SessionRecord`]s into a fresh store.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if a record
/// has an empty token.
pub fn load_session_file(path: &Path) -> anyhow::Result<InMemorySessionStore> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading session file {}", path.display()))?;
    let records: Vec<SessionRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing session file {}", path.display()))?;

    let store = InMemorySessionStore::new();
    let now = SystemTime::now();
    for record in records {
        anyhow::ensure!(
            !record.token.is_empty(),
            "session for user `{}` in tenant `{}` has an empty token",
            record.user_id,
            record.tenant_id
        );
        store.insert(
            &record.tenant_id,
            &record.token,
            Session {
                user_id: record.user_id,
                expires_at: now + Duration::from_secs(record.ttl_secs),
            },
        );
    }
    Ok(store)
}

/// Purges expired sessions from `store` every `period` until `shutdown`
/// is cancelled.
pub fn spawn_session_purger(
    store: Arc<InMemorySessionStore>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let before = store.len();
                    store.purge_expired();
                    debug!(purged = before.saturating_sub(store.len()), "expired sessions purged");
                }
            }
        }
    })
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_session(&self, tenant_id: &str, token: &str) -> anyhow::Result<Option<Session>> {
        Ok(self
            .sessions
            .get(&(tenant_id.to_string(), token_digest(token)))
            .map(|entry| entry.value().clone()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
