//! # Session resolution
//!
//! The identity provider is an external collaborator: this module models it
//! as an injected [`SessionGateway`] so handlers (and tests) never depend on
//! a live service. The production implementation talks to the provider over
//! HTTP; handlers obtain the caller through the [`CurrentUser`] /
//! [`OptionalUser`] extractors, which read the `portal_session` cookie.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::COOKIE, request::Parts},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{ApiError, unauthorized};
use crate::server::AppState;

/// Name of the browser session cookie.
pub const SESSION_COOKIE: &str = "portal_session";

/// The authenticated account owner, as reported by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// A session issued by the identity provider in exchange for an auth code.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Errors from the identity provider boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("identity provider request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("identity provider returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("identity provider returned a malformed response: {0}")]
    Malformed(String),
}

/// External session/identity gateway.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// Resolve a session token to its user, `None` when the session is
    /// missing, expired, or revoked.
    async fn resolve_user(&self, session_token: &str)
    -> Result<Option<SessionUser>, GatewayError>;

    /// Exchange a magic-link/auth code for a session.
    async fn exchange_code(&self, code: &str) -> Result<SessionToken, GatewayError>;
}

/// Production gateway calling the identity provider's REST surface.
pub struct HttpSessionGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpSessionGateway {
    pub fn new(http: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl SessionGateway for HttpSessionGateway {
    async fn resolve_user(
        &self,
        session_token: &str,
    ) -> Result<Option<SessionUser>, GatewayError> {
        let mut request = self
            .http
            .get(format!("{}/user", self.base_url))
            .bearer_auth(session_token);
        if let Some(ref api_key) = self.api_key {
            request = request.header("apikey", api_key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let user: SessionUser = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        Ok(Some(user))
    }

    async fn exchange_code(&self, code: &str) -> Result<SessionToken, GatewayError> {
        let mut request = self
            .http
            .post(format!("{}/token", self.base_url))
            .json(&serde_json::json!({
                "grant_type": "authorization_code",
                "code": code,
            }));
        if let Some(ref api_key) = self.api_key {
            request = request.header("apikey", api_key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

/// Reads a cookie value from the request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie_header = headers.get(COOKIE)?.to_str().ok()?;
    cookie_header
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
        .map(str::to_string)
}

/// Formats a short-lived, browser-scoped cookie.
pub fn build_cookie(name: &str, value: &str, max_age_secs: u64) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; Secure; SameSite=Lax",
        name, value, max_age_secs
    )
}

/// Formats a cookie removal (Max-Age=0).
pub fn clear_cookie(name: &str) -> String {
    build_cookie(name, "", 0)
}

/// Resolves the caller from the session cookie; `None` for anonymous
/// requests. Gateway failures are logged and treated as anonymous so a
/// flaky identity provider degrades to a login redirect, not a 500.
pub async fn resolve_session(state: &AppState, headers: &HeaderMap) -> Option<SessionUser> {
    let token = cookie_value(headers, SESSION_COOKIE)?;
    match state.sessions.resolve_user(&token).await {
        Ok(user) => user,
        Err(err) => {
            tracing::warn!(error = %err, "Session resolution failed");
            None
        }
    }
}

/// Extractor yielding the session user when present; never rejects.
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<SessionUser>);

impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(OptionalUser(resolve_session(state, &parts.headers).await))
    }
}

/// Extractor requiring an authenticated session; rejects with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub SessionUser);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        resolve_session(state, &parts.headers)
            .await
            .map(CurrentUser)
            .ok_or_else(|| unauthorized(Some("No active session")))
    }
}
