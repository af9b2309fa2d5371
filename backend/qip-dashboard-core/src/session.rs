// src/session.rs
use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::clock::{span_from_secs, Clock};
use crate::identity::{IdentityError, IdentityProvider, IdentityTokens};
use crate::store::{DocumentStore, StoreAuth, SYSTEM_CONFIG_PATH};

pub const SESSION_COOKIE_NAME: &str = "qip_session";
const SESSION_ID_LEN: usize = 32;
// Refresh the ID token this long before the provider says it expires.
const TOKEN_REFRESH_LEEWAY_SECS: i64 = 60;
const ADMIN_LIST_KEY: &str = "admin_emails";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Not signed in")]
    NotAuthenticated,
    #[error("Signed-in user is not an administrator")]
    NotAuthorized,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub email: String,
    pub uid: String,
    pub is_admin: bool,
    pub login_time: DateTime<Utc>,
    #[serde(skip)]
    pub id_token: String,
    #[serde(skip)]
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    pub last_seen: DateTime<Utc>,
}

impl Session {
    pub fn store_auth(&self) -> StoreAuth {
        StoreAuth::User(self.id_token.clone())
    }

    fn token_needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_LEEWAY_SECS) >= self.expires_at
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Reads `admin_emails` out of a `system/config` document.
pub fn admin_emails_from_config(config: &Value) -> Vec<String> {
    config
        .get("admin_emails")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(normalize_email)
                .filter(|email| !email.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Server-side sessions keyed by the opaque cookie id.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    admin_emails: TtlCache<&'static str, Vec<String>>,
    idle_lifetime: Duration,
    secure_cookie: bool,
}

impl SessionStore {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        idle_lifetime_secs: u64,
        admin_cache_ttl_secs: u64,
        secure_cookie: bool,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            identity,
            store,
            admin_emails: TtlCache::new(admin_cache_ttl_secs, 1, clock.clone()),
            clock,
            idle_lifetime: span_from_secs(idle_lifetime_secs),
            secure_cookie,
        }
    }

    fn is_idle(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now - session.last_seen > self.idle_lifetime
    }

    /// Drops every session past its idle lifetime.
    fn sweep_idle(&self, sessions: &mut HashMap<String, Session>, now: DateTime<Utc>) {
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_idle(session, now));
        let swept = before - sessions.len();
        if swept > 0 {
            debug!("Swept {} idle session(s), {} remain", swept, sessions.len());
        }
    }

    fn new_session_id() -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LEN)
            .map(char::from)
            .collect()
    }

    /// Signs in through the identity provider and opens a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let tokens = self.identity.sign_in(email, password).await?;
        let now = self.clock.now();
        let email = normalize_email(tokens.email.as_deref().unwrap_or(email));
        let auth = StoreAuth::User(tokens.id_token.clone());
        let is_admin = self.admin_allow_list(&auth).await.contains(&email);

        let session = Session {
            id: Self::new_session_id(),
            email,
            uid: tokens.uid.clone(),
            is_admin,
            login_time: now,
            id_token: tokens.id_token,
            refresh_token: tokens.refresh_token,
            expires_at: now + Duration::seconds(tokens.expires_in),
            last_seen: now,
        };
        info!(
            "Session opened for {} (admin: {})",
            session.email, session.is_admin
        );
        let mut sessions = self.sessions.lock().await;
        self.sweep_idle(&mut sessions, now);
        sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// Resolves the caller's session, refreshing an expiring ID token.
    pub async fn check_authenticated(&self, headers: &HeaderMap) -> Result<Session, AuthError> {
        let Some(session_id) = session_id_from_headers(headers) else {
            return Err(AuthError::NotAuthenticated);
        };
        let now = self.clock.now();

        let current = {
            let mut sessions = self.sessions.lock().await;
            let Some(session) = sessions.get(&session_id) else {
                debug!("Unknown session id presented");
                return Err(AuthError::NotAuthenticated);
            };
            if self.is_idle(session, now) {
                info!("Session for {} expired after idle lifetime", session.email);
                sessions.remove(&session_id);
                return Err(AuthError::NotAuthenticated);
            }
            let current = session.clone();
            self.sweep_idle(&mut sessions, now);
            current
        };

        let mut session = current;
        if session.token_needs_refresh(now) {
            match self.identity.refresh(&session.refresh_token).await {
                Ok(tokens) => apply_refresh(&mut session, tokens, now),
                Err(e) => {
                    warn!("Token refresh failed for {}: {}", session.email, e);
                    self.clear(&session_id).await;
                    return Err(AuthError::NotAuthenticated);
                }
            }
        }
        session.last_seen = now;
        // A sign-out during the refresh wins.
        match self.sessions.lock().await.get_mut(&session_id) {
            Some(slot) => *slot = session.clone(),
            None => {
                debug!("Session for {} closed while in use", session.email);
                return Err(AuthError::NotAuthenticated);
            }
        }
        Ok(session)
    }

    /// Like [`check_authenticated`](Self::check_authenticated), but the email
    /// must also be on the `system/config` admin allow-list.
    pub async fn require_administrator(&self, headers: &HeaderMap) -> Result<Session, AuthError> {
        let mut session = self.check_authenticated(headers).await?;
        let allow_list = self.admin_allow_list(&session.store_auth()).await;
        if !allow_list.contains(&session.email) {
            warn!("{} is not on the admin allow-list", session.email);
            self.clear(&session.id).await;
            return Err(AuthError::NotAuthorized);
        }
        session.is_admin = true;
        Ok(session)
    }

    pub async fn sign_out(&self, headers: &HeaderMap) {
        if let Some(session_id) = session_id_from_headers(headers) {
            self.clear(&session_id).await;
        }
    }

    async fn clear(&self, session_id: &str) {
        if let Some(session) = self.sessions.lock().await.remove(session_id) {
            info!("Session cleared for {}", session.email);
        }
    }

    #[cfg(test)]
    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Fetched once per TTL window; a failed fetch is not memoized.
    async fn admin_allow_list(&self, auth: &StoreAuth) -> Vec<String> {
        if let Some(cached) = self.admin_emails.get(&ADMIN_LIST_KEY) {
            return cached;
        }
        match self.store.get_document(SYSTEM_CONFIG_PATH, auth).await {
            Ok(Some(config)) => {
                let emails = admin_emails_from_config(&config);
                debug!("Loaded {} admin emails", emails.len());
                self.admin_emails.insert(ADMIN_LIST_KEY, emails.clone());
                emails
            }
            Ok(None) => {
                warn!("{} not found, no administrators configured", SYSTEM_CONFIG_PATH);
                self.admin_emails.insert(ADMIN_LIST_KEY, Vec::new());
                Vec::new()
            }
            Err(e) => {
                warn!("Failed to load admin allow-list: {}", e);
                Vec::new()
            }
        }
    }

    /// Drops the memoized allow-list after `system/config` changes.
    #[cfg(test)]
    pub fn invalidate_admin_list(&self) {
        self.admin_emails.invalidate(&ADMIN_LIST_KEY);
    }

    pub fn session_cookie(&self, session_id: &str) -> HeaderValue {
        let secure = if self.secure_cookie { "; Secure" } else { "" };
        // No Max-Age: the cookie lives as long as the browser session.
        let raw = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax{}",
            SESSION_COOKIE_NAME, session_id, secure
        );
        HeaderValue::from_str(&raw).unwrap_or_else(|_| HeaderValue::from_static(""))
    }

    pub fn clear_cookie(&self) -> HeaderValue {
        HeaderValue::from_static("qip_session=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
    }
}

fn apply_refresh(session: &mut Session, tokens: IdentityTokens, now: DateTime<Utc>) {
    debug!("Refreshed ID token for {}", session.email);
    session.id_token = tokens.id_token;
    session.refresh_token = tokens.refresh_token;
    session.expires_at = now + Duration::seconds(tokens.expires_in);
}

pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
