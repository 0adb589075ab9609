//! Google Calendar provider client
//!
//! Authorization URL construction, code-for-token exchange, and the
//! calendar-list lookup needed to select the coach's primary calendar.

use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

/// Calendar scopes requested at authorization. Offline access is requested
/// separately so a refresh token is issued.
const CALENDAR_SCOPES: &str = "https://www.googleapis.com/auth/calendar.readonly https://www.googleapis.com/auth/calendar.events";

/// Google provider specific errors
#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Token exchange failed with status {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("Calendar list request failed with status {status}: {body}")]
    CalendarList { status: u16, body: String },

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

/// Successful token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarList {
    #[serde(default)]
    items: Vec<CalendarEntry>,
}

#[derive(Debug, Deserialize)]
struct CalendarEntry {
    id: String,
    #[serde(default)]
    primary: bool,
}

/// Google provider client
#[derive(Clone)]
pub struct GoogleProvider {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    auth_base: String,
    token_base: String,
    api_base: String,
}

impl GoogleProvider {
    pub fn new(
        http: reqwest::Client,
        client_id: String,
        client_secret: String,
        auth_base: String,
        token_base: String,
        api_base: String,
    ) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            auth_base: auth_base.trim_end_matches('/').to_string(),
            token_base: token_base.trim_end_matches('/').to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Build the consent-screen URL. `access_type=offline` plus
    /// `prompt=consent` ensure Google re-issues a refresh token on reconnect.
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<Url, GoogleError> {
        let mut url = Url::parse(&format!("{}/o/oauth2/v2/auth", self.auth_base))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("scope", CALENDAR_SCOPES)
            .append_pair("state", state);

        Ok(url)
    }

    /// Exchange an authorization code for tokens. The redirect URI must be
    /// the exact value used at start.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<GoogleTokens, GoogleError> {
        let mut params = HashMap::new();
        params.insert("code", code.to_string());
        params.insert("client_id", self.client_id.clone());
        params.insert("client_secret", self.client_secret.clone());
        params.insert("redirect_uri", redirect_uri.to_string());
        params.insert("grant_type", "authorization_code".to_string());

        let response = self
            .http
            .post(format!("{}/token", self.token_base))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "Google token exchange failed");
            return Err(GoogleError::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    /// List the user's calendars and pick the one flagged `primary`, falling
    /// back to the first entry. `Ok(None)` means the list was empty.
    pub async fn primary_calendar_id(
        &self,
        access_token: &str,
    ) -> Result<Option<String>, GoogleError> {
        let response = self
            .http
            .get(format!(
                "{}/calendar/v3/users/me/calendarList",
                self.api_base
            ))
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "Calendar list failed");
            return Err(GoogleError::CalendarList {
                status: status.as_u16(),
                body,
            });
        }

        let list: CalendarList = response.json().await?;
        let picked = list
            .items
            .iter()
            .find(|entry| entry.primary)
            .or_else(|| list.items.first());

        Ok(picked.map(|entry| entry.id.clone()))
    }
}
