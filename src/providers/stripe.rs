//! Stripe Connect provider client
//!
//! Express account creation, onboarding link creation, and account
//! retrieval. Stripe's API is form-encoded with bearer authentication; there
//! is no OAuth code exchange in this flow, the account link IS the consent
//! step.

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// Stripe provider specific errors
#[derive(Debug, Error)]
pub enum StripeError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Stripe API returned status {status}: {body}")]
    Api { status: u16, body: String },
}

/// Connected account, reduced to the fields the portal reads.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeAccount {
    pub id: String,
    #[serde(default)]
    pub details_submitted: bool,
    #[serde(default)]
    pub charges_enabled: bool,
}

impl StripeAccount {
    /// Onboarding is complete once details are submitted and the account can
    /// take charges.
    pub fn onboarding_complete(&self) -> bool {
        self.details_submitted && self.charges_enabled
    }
}

#[derive(Debug, Deserialize)]
struct AccountLink {
    url: String,
}

/// Stripe provider client
#[derive(Clone)]
pub struct StripeProvider {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeProvider {
    pub fn new(http: reqwest::Client, secret_key: String, api_base: String) -> Self {
        Self {
            http,
            secret_key,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Create an Express account for the coach, tagging it with the portal
    /// user id so the account can be traced back from the Stripe dashboard.
    pub async fn create_express_account(
        &self,
        email: Option<&str>,
        user_id: Uuid,
    ) -> Result<StripeAccount, StripeError> {
        let user_id = user_id.to_string();
        let mut params = vec![("type", "express"), ("metadata[user_id]", &user_id)];
        if let Some(email) = email {
            params.push(("email", email));
        }

        let response = self
            .http
            .post(format!("{}/v1/accounts", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await?;

        Self::read_json(response).await
    }

    /// Create a hosted onboarding link for an existing account.
    pub async fn create_onboarding_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<String, StripeError> {
        let params = [
            ("account", account_id),
            ("refresh_url", refresh_url),
            ("return_url", return_url),
            ("type", "account_onboarding"),
        ];

        let response = self
            .http
            .post(format!("{}/v1/account_links", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await?;

        let link: AccountLink = Self::read_json(response).await?;
        Ok(link.url)
    }

    /// Retrieve the current state of a connected account.
    pub async fn retrieve_account(&self, account_id: &str) -> Result<StripeAccount, StripeError> {
        let response = self
            .http
            .get(format!("{}/v1/accounts/{}", self.api_base, account_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        Self::read_json(response).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "Stripe API call failed");
            return Err(StripeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}
