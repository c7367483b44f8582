//! Authenticated "Concept/action" client.

use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::http::{build_http_client, decode_body, send_request};
use crate::auth::SessionManager;
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Where an action expects the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPlacement {
    /// Public action; no token is sent
    None,
    /// Bearer header whenever a session exists
    Header,
    /// Bearer header plus an `accessToken` field in the JSON body; requires a session
    HeaderAndBody,
}

/// A 401, or a 504 while a token was attached, means the token was refused.
pub(crate) const fn is_token_rejection(status: Option<u16>, had_token: bool) -> bool {
    had_token && matches!(status, Some(401 | 504))
}

/// Whether a failed call earns a refresh and a second attempt.
///
/// Token rejections are retried once per call.
pub(crate) const fn should_refresh_and_retry(
    status: Option<u16>,
    had_token: bool,
    already_retried: bool,
) -> bool {
    !already_retried && is_token_rejection(status, had_token)
}

/// Merge `accessToken` into a JSON object body.
pub(crate) fn with_body_token(body: &Value, token: &str) -> Value {
    let mut payload = body.clone();
    if let Value::Object(fields) = &mut payload {
        fields.insert("accessToken".to_string(), Value::String(token.to_string()));
    }
    payload
}

#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    http: Client,
    session: Arc<SessionManager>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Arc<SessionManager>) -> Result<Self> {
        let http = build_http_client(&config)?;
        Ok(Self {
            config,
            http,
            session,
        })
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Invoke an action and decode its answer.
    pub async fn call<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Value,
        placement: TokenPlacement,
    ) -> Result<R> {
        let url = self.config.endpoint_url(endpoint);
        let mut token = self.token_for(placement).await?;
        let mut retried = false;

        loop {
            let payload = match (placement, token.as_deref()) {
                (TokenPlacement::HeaderAndBody, Some(token)) => with_body_token(&body, token),
                _ => body.clone(),
            };
            let mut request = self.http.post(&url).json(&payload);
            if let Some(token) = token.as_deref() {
                request = request.bearer_auth(token);
            }

            match send_request(request).await {
                Ok(text) => return decode_body(&text),
                Err(error) if should_refresh_and_retry(error.status(), token.is_some(), retried) => {
                    tracing::debug!(
                        endpoint,
                        status = ?error.status(),
                        "Refreshing access token before retrying"
                    );
                    retried = true;
                    token = Some(self.session.refresh().await?);
                }
                Err(error) if retried && is_token_rejection(error.status(), token.is_some()) => {
                    tracing::warn!(endpoint, "Refreshed token was rejected too, signing out");
                    self.session.clear();
                    return Err(Error::SessionExpired);
                }
                Err(error) => {
                    tracing::debug!(endpoint, "Action failed: {}", error);
                    return Err(error);
                }
            }
        }
    }

    /// Invoke an action whose answer is ignored.
    pub async fn execute(
        &self,
        endpoint: &str,
        body: Value,
        placement: TokenPlacement,
    ) -> Result<()> {
        let _: serde::de::IgnoredAny = self.call(endpoint, body, placement).await?;
        Ok(())
    }

    /// Run a query action; queries always answer with an array.
    pub async fn query<R: DeserializeOwned>(&self, endpoint: &str, body: Value) -> Result<Vec<R>> {
        self.call(endpoint, body, TokenPlacement::Header).await
    }

    /// First row of a query; an empty answer is `NotFound`.
    pub async fn query_first<R: DeserializeOwned>(&self, endpoint: &str, body: Value) -> Result<R> {
        self.query(endpoint, body)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(endpoint.to_string()))
    }

    /// Probe the backend; any HTTP answer counts as reachable.
    pub async fn check_backend(&self) -> Result<u16> {
        let url = self.config.endpoint_url("UserAuthentication/register");
        let response = self
            .http
            .request(reqwest::Method::OPTIONS, &url)
            .send()
            .await?;
        let status = response.status().as_u16();
        tracing::info!(status, "Backend is reachable");
        Ok(status)
    }

    async fn token_for(&self, placement: TokenPlacement) -> Result<Option<String>> {
        match placement {
            TokenPlacement::None => Ok(None),
            TokenPlacement::Header if !self.session.is_authenticated() => Ok(None),
            TokenPlacement::Header | TokenPlacement::HeaderAndBody => {
                self.session.valid_access_token().await.map(Some)
            }
        }
    }
}
