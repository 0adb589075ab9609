//! Square provider client
//!
//! Authorization URL construction and code-for-token exchange against the
//! Square OAuth surface. Webhook signature verification lives in
//! `webhook_verification` because it operates on raw request bytes, not on
//! this client.

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Minimal scope: the portal only reads the merchant profile.
const SQUARE_SCOPE: &str = "MERCHANT_PROFILE_READ";

/// Square provider specific errors
#[derive(Debug, Error)]
pub enum SquareError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Token exchange failed: {message}")]
    TokenExchange { message: String },

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

/// Token endpoint response. Square reports failures both via HTTP status and
/// via an `error` field inside a 2xx body; both are checked.
#[derive(Debug, Clone, Deserialize)]
pub struct SquareTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub merchant_id: Option<String>,
    pub expires_at: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Square provider client
#[derive(Clone)]
pub struct SquareProvider {
    http: reqwest::Client,
    app_id: String,
    app_secret: String,
    base: String,
}

impl SquareProvider {
    pub fn new(http: reqwest::Client, app_id: String, app_secret: String, base: String) -> Self {
        Self {
            http,
            app_id,
            app_secret,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Build the merchant authorization URL. `session=false` forces Square to
    /// show the login screen rather than reusing a sandbox session.
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<Url, SquareError> {
        let mut url = Url::parse(&format!("{}/oauth2/authorize", self.base))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.app_id)
            .append_pair("scope", SQUARE_SCOPE)
            .append_pair("session", "false")
            .append_pair("state", state)
            .append_pair("redirect_uri", redirect_uri);

        Ok(url)
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<SquareTokens, SquareError> {
        let response = self
            .http
            .post(format!("{}/oauth2/token", self.base))
            .json(&serde_json::json!({
                "client_id": self.app_id,
                "client_secret": self.app_secret,
                "code": code,
                "grant_type": "authorization_code",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<SquareTokens>(&body)
                .ok()
                .and_then(|t| t.error_description.or(t.error))
                .unwrap_or_else(|| "token_exchange_failed".to_string());
            tracing::error!(status = status.as_u16(), body = %body, "Square token exchange failed");
            return Err(SquareError::TokenExchange { message });
        }

        let tokens: SquareTokens = response.json().await?;
        if tokens.error.is_some() {
            let message = tokens
                .error_description
                .clone()
                .or(tokens.error.clone())
                .unwrap_or_else(|| "token_exchange_failed".to_string());
            tracing::error!(error = %message, "Square token exchange reported an error body");
            return Err(SquareError::TokenExchange { message });
        }

        Ok(tokens)
    }
}
