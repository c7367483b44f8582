//! Session and token management.
//!
//! [`SessionManager`] owns the access/refresh token pair, persists it in the
//! local key-value store and refreshes the access token ahead of expiry.
//! Every authenticated call goes through [`SessionManager::valid_access_token`]
//! first. Session transitions are published on a `watch` channel so the push
//! router can rebuild its connection on login/refresh and drop it on logout.

mod jwt;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Mutex};

use crate::api::http::{build_http_client, post_json};
use crate::config::ClientConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::models::UserId;
use crate::storage::{KeyValueStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USERNAME_KEY};

pub use jwt::{decode_claims, epoch_now, is_token_expired, user_id_from_token, Claims};

#[cfg(test)]
pub(crate) use jwt::encode_test_token;

/// The signed-in user's credentials and derived identity.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
}

impl Session {
    fn new(access_token: String, refresh_token: Option<String>, username: Option<String>) -> Self {
        let user_id = user_id_from_token(&access_token);
        Self {
            access_token,
            refresh_token,
            user_id,
            username,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .finish()
    }
}

/// Token pair returned by login and registration.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<UserId>,
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

/// Published on every session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    /// `generation` increases on every login and token refresh
    SignedIn {
        user_id: Option<UserId>,
        generation: u64,
    },
}

impl AuthState {
    pub const fn is_signed_in(&self) -> bool {
        matches!(self, Self::SignedIn { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthFailureKind {
    InvalidCredentials,
    Timeout,
    NetworkUnreachable,
    EndpointNotFound,
    ServerError,
    Rejected,
}

/// A categorised, human-readable login or registration failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AuthFailure {
    pub kind: AuthFailureKind,
    pub message: String,
}

impl AuthFailure {
    fn from_error(error: &Error) -> Self {
        let (kind, message) = match error {
            Error::Timeout => (
                AuthFailureKind::Timeout,
                "Request timed out. The backend may still be waking up; wait a moment and try again."
                    .to_string(),
            ),
            Error::Network(_) => (
                AuthFailureKind::NetworkUnreachable,
                "Cannot connect to server. Check that the backend is running and the API base URL is correct."
                    .to_string(),
            ),
            Error::Unauthorized => (
                AuthFailureKind::InvalidCredentials,
                "Invalid username or password.".to_string(),
            ),
            Error::Api { status: 404, .. } => (
                AuthFailureKind::EndpointNotFound,
                "API endpoint not found. Please check your backend configuration.".to_string(),
            ),
            Error::Server { .. } => (
                AuthFailureKind::ServerError,
                "Server error. Please try again later.".to_string(),
            ),
            Error::Api { message, .. } => (AuthFailureKind::Rejected, message.clone()),
            other => (AuthFailureKind::Rejected, other.to_string()),
        };
        Self { kind, message }
    }
}

/// Backend calls owned by the `UserAuthentication` concept.
#[async_trait]
pub trait AuthTransport: Send + Sync + 'static {
    async fn login(&self, username: &str, password: &str) -> Result<AuthTokens>;
    async fn register(&self, username: &str, password: &str, email: &str) -> Result<AuthTokens>;
    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<String>;
    async fn logout(&self, refresh_token: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct HttpAuthTransport {
    config: ClientConfig,
    client: reqwest::Client,
}

impl HttpAuthTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = build_http_client(&config)?;
        Ok(Self { config, client })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

#[async_trait]
impl AuthTransport for HttpAuthTransport {
    async fn login(&self, username: &str, password: &str) -> Result<AuthTokens> {
        let payload = serde_json::json!({
            "username": username,
            "password": password,
        });
        post_json(
            &self.client,
            &self.config.endpoint_url("UserAuthentication/login"),
            &payload,
            None,
        )
        .await
    }

    async fn register(&self, username: &str, password: &str, email: &str) -> Result<AuthTokens> {
        let payload = serde_json::json!({
            "username": username,
            "password": password,
            "email": email,
        });
        post_json(
            &self.client,
            &self.config.endpoint_url("UserAuthentication/register"),
            &payload,
            None,
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<String> {
        let payload = serde_json::json!({ "refreshToken": refresh_token });
        let response: RefreshResponse = post_json(
            &self.client,
            &self.config.endpoint_url("UserAuthentication/refreshAccessToken"),
            &payload,
            None,
        )
        .await?;
        Ok(response.access_token)
    }

    async fn logout(&self, refresh_token: &str) -> Result<()> {
        let payload = serde_json::json!({ "refreshToken": refresh_token });
        let _: serde::de::IgnoredAny = post_json(
            &self.client,
            &self.config.endpoint_url("UserAuthentication/logout"),
            &payload,
            None,
        )
        .await?;
        Ok(())
    }
}

pub struct SessionManager {
    transport: Arc<dyn AuthTransport>,
    store: Arc<dyn KeyValueStore>,
    expiry_margin_secs: i64,
    session: RwLock<Option<Session>>,
    refresh_gate: Mutex<()>,
    generation: AtomicU64,
    state: watch::Sender<AuthState>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn AuthTransport>,
        store: Arc<dyn KeyValueStore>,
        expiry_margin_secs: i64,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::SignedOut);
        Self {
            transport,
            store,
            expiry_margin_secs,
            session: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
            state,
        }
    }

    /// Restore a previously persisted session, if any.
    pub fn initialize(&self) -> Result<Option<Session>> {
        let Some(access_token) = self.store.get(ACCESS_TOKEN_KEY)? else {
            return Ok(None);
        };
        let refresh_token = self.store.get(REFRESH_TOKEN_KEY)?;
        let username = self.store.get(USERNAME_KEY)?;
        let session = Session::new(access_token, refresh_token, username);
        tracing::info!(user_id = ?session.user_id, "Restored persisted session");
        self.install(session.clone());
        Ok(Some(session))
    }

    pub async fn login(&self, username: &str, password: &str) -> std::result::Result<Session, AuthFailure> {
        validate_credentials(username, password)?;
        match self.transport.login(username.trim(), password).await {
            Ok(tokens) => Ok(self.sign_in(tokens, username.trim())),
            Err(error) => {
                tracing::warn!("Login failed: {}", error);
                Err(AuthFailure::from_error(&error))
            }
        }
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> std::result::Result<Session, AuthFailure> {
        validate_credentials(username, password)?;
        match self
            .transport
            .register(username.trim(), password, email.trim())
            .await
        {
            Ok(tokens) => Ok(self.sign_in(tokens, username.trim())),
            Err(error) => {
                tracing::warn!("Registration failed: {}", error);
                Err(AuthFailure::from_error(&error))
            }
        }
    }

    /// Best-effort server logout; the local session is always cleared.
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.refresh_token() {
            if let Err(error) = self.transport.logout(&refresh_token).await {
                tracing::warn!("Logout request failed: {}", error);
            }
        }
        self.clear();
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Concurrent callers share one exchange. When the backend rejects the
    /// refresh token the whole session is cleared and `SessionExpired` is
    /// returned; transport failures leave the session in place.
    pub async fn refresh(&self) -> Result<String> {
        let observed = self.access_token();
        let _gate = self.refresh_gate.lock().await;

        if let Some(current) = self.access_token() {
            if observed.as_ref() != Some(&current) && !self.token_expired(&current) {
                return Ok(current);
            }
        }

        let Some(refresh_token) = self.refresh_token() else {
            return Err(Error::NotAuthenticated);
        };

        match self.transport.refresh(&refresh_token).await {
            Ok(access_token) => {
                self.replace_access_token(&access_token);
                tracing::info!("Access token refreshed");
                Ok(access_token)
            }
            Err(error) if matches!(error.kind(), ErrorKind::Network | ErrorKind::Timeout) => {
                tracing::warn!("Token refresh could not reach the backend: {}", error);
                Err(error)
            }
            Err(error) => {
                tracing::warn!("Token refresh rejected, clearing session: {}", error);
                self.clear();
                Err(Error::SessionExpired)
            }
        }
    }

    /// Current access token, refreshed first if it is about to expire.
    pub async fn valid_access_token(&self) -> Result<String> {
        let token = self.access_token().ok_or(Error::NotAuthenticated)?;
        if self.token_expired(&token) {
            self.refresh().await
        } else {
            Ok(token)
        }
    }

    pub fn token_expired(&self, token: &str) -> bool {
        is_token_expired(token, epoch_now(), self.expiry_margin_secs)
    }

    /// Whether the held access token is missing or inside the safety margin.
    pub fn access_token_expired(&self) -> bool {
        self.access_token()
            .map_or(true, |token| self.token_expired(&token))
    }

    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.session().map(|session| session.access_token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.session().and_then(|session| session.refresh_token)
    }

    pub fn current_user_id(&self) -> Option<UserId> {
        self.session().and_then(|session| session.user_id)
    }

    pub fn username(&self) -> Option<String> {
        self.session().and_then(|session| session.username)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Drop every credential, locally and in storage.
    pub fn clear(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
        if let Err(error) = self.persist(None) {
            tracing::warn!("Failed to clear persisted session: {}", error);
        }
        self.state.send_replace(AuthState::SignedOut);
        tracing::info!("Session cleared");
    }

    fn sign_in(&self, tokens: AuthTokens, username: &str) -> Session {
        let mut session = Session::new(
            tokens.access_token,
            Some(tokens.refresh_token),
            Some(username.to_string()),
        );
        if session.user_id.is_none() {
            session.user_id = tokens.user;
        }
        tracing::info!(user_id = ?session.user_id, "Signed in");
        self.install(session.clone());
        session
    }

    fn replace_access_token(&self, access_token: &str) {
        let updated = {
            let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
            let Some(session) = guard.as_mut() else {
                return;
            };
            session.access_token = access_token.to_string();
            if let Some(user_id) = user_id_from_token(access_token) {
                session.user_id = Some(user_id);
            }
            session.clone()
        };
        self.publish(&updated);
    }

    fn install(&self, session: Session) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        self.publish(&session);
    }

    fn publish(&self, session: &Session) {
        if let Err(error) = self.persist(Some(session)) {
            tracing::warn!("Failed to persist session: {}", error);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(AuthState::SignedIn {
            user_id: session.user_id.clone(),
            generation,
        });
    }

    fn persist(&self, session: Option<&Session>) -> Result<()> {
        self.store.set_or_remove(
            ACCESS_TOKEN_KEY,
            session.map(|session| session.access_token.as_str()),
        )?;
        self.store.set_or_remove(
            REFRESH_TOKEN_KEY,
            session.and_then(|session| session.refresh_token.as_deref()),
        )?;
        self.store.set_or_remove(
            USERNAME_KEY,
            session.and_then(|session| session.username.as_deref()),
        )
    }
}

fn validate_credentials(username: &str, password: &str) -> std::result::Result<(), AuthFailure> {
    if username.trim().is_empty() {
        return Err(AuthFailure {
            kind: AuthFailureKind::Rejected,
            message: "Username is required".to_string(),
        });
    }
    if password.is_empty() {
        return Err(AuthFailure {
            kind: AuthFailureKind::Rejected,
            message: "Password is required".to_string(),
        });
    }
    Ok(())
}
