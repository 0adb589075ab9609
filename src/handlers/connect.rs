//! # Connection Handlers
//!
//! Start and callback handlers for the three provider connection flows.
//!
//! Every failure in these flows is surfaced as a status-page redirect
//! carrying query parameters rather than an HTTP error body: the human actor
//! is mid-browser-flow and must land on a page that can render a message.
//! No step is retried; the user restarts the connect flow instead.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, header::SET_COOKIE},
    response::{IntoResponse, Redirect, Response},
};
use chrono::DateTime;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::auth::{OptionalUser, SessionUser, build_cookie, clear_cookie, cookie_value};
use crate::server::AppState;

pub const GOOGLE_STATE_COOKIE: &str = "google_oauth_state";
pub const SQUARE_STATE_COOKIE: &str = "square_oauth_state";

/// Query parameters delivered by a provider redirect
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackQuery {
    /// Provider-reported error, preferring the human-readable description.
    fn provider_error(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|error| self.error_description.clone().unwrap_or_else(|| error.clone()))
    }
}

/// Generate a cryptographically secure random state nonce
fn generate_state() -> String {
    use rand::Rng;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);

    base64_url::encode(&bytes)
}

/// Absolute URL of a portal page with query parameters, properly encoded.
fn page_url(state: &AppState, path: &str, params: &[(&str, &str)]) -> String {
    let base = format!("{}{}", state.config.site_url_trimmed(), path);
    match Url::parse(&base) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(params);
            url.to_string()
        }
        // site_url is validated at startup; fall back to a relative path
        Err(_) => path.to_string(),
    }
}

fn login_redirect(state: &AppState) -> Response {
    Redirect::temporary(&page_url(state, "/login", &[("e", "not_logged_in")])).into_response()
}

fn flow_error(state: &AppState, provider: &str, error: &str) -> Response {
    tracing::warn!(provider, error, "Connect flow terminated with error");
    Redirect::temporary(&page_url(
        state,
        "/dashboard/connections",
        &[("provider", provider), ("status", "error"), ("error", error)],
    ))
    .into_response()
}

fn flow_status(state: &AppState, provider: &str, status: &str) -> Response {
    Redirect::temporary(&page_url(
        state,
        "/dashboard/connections",
        &[("provider", provider), ("status", status)],
    ))
    .into_response()
}

fn with_cookie(mut response: Response, cookie: String) -> Response {
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

/// Issue a state nonce: persisted for single-use consumption at callback and
/// mirrored into a short-lived browser cookie.
async fn issue_state(
    state: &AppState,
    user_id: Uuid,
    provider: &str,
) -> Result<String, sea_orm::DbErr> {
    let nonce = generate_state();
    state
        .state_repo()
        .create(user_id, provider, &nonce, state.config.oauth_state_ttl_minutes)
        .await?;
    Ok(nonce)
}

/// Validate the callback's state: cookie and returned value must match, and
/// the persisted nonce must still be live. The nonce is consumed here so a
/// replayed callback cannot validate twice.
async fn consume_state(
    state: &AppState,
    user: &SessionUser,
    provider: &str,
    cookie_name: &str,
    headers: &HeaderMap,
    returned: Option<&str>,
) -> Result<bool, sea_orm::DbErr> {
    let (Some(returned), Some(cookie)) = (returned, cookie_value(headers, cookie_name)) else {
        return Ok(false);
    };
    if returned != cookie {
        return Ok(false);
    }

    Ok(state
        .state_repo()
        .find_and_consume(user.id, provider, returned)
        .await?
        .is_some())
}

fn state_cookie_ttl(state: &AppState) -> u64 {
    (state.config.oauth_state_ttl_minutes as u64) * 60
}

// ---------------------------------------------------------------------------
// Google Calendar
// ---------------------------------------------------------------------------

/// Start the Google Calendar connect flow
pub async fn google_start(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
) -> Response {
    let Some(user) = user else {
        return login_redirect(&state);
    };
    let Some(google) = state.google() else {
        return flow_error(&state, "google", "missing_google_env");
    };

    let nonce = match issue_state(&state, user.id, "google").await {
        Ok(nonce) => nonce,
        Err(err) => {
            tracing::error!(error = %err, "Failed to persist OAuth state");
            return flow_error(&state, "google", "state_create_failed");
        }
    };

    let redirect_uri = format!(
        "{}/connect/google/callback",
        state.config.site_url_trimmed()
    );
    let authorize_url = match google.authorize_url(&redirect_uri, &nonce) {
        Ok(url) => url,
        Err(err) => {
            tracing::error!(error = %err, "Failed to build Google authorize URL");
            return flow_error(&state, "google", "authorize_url_failed");
        }
    };

    tracing::info!(user_id = %user.id, "Google connect flow initiated");

    with_cookie(
        Redirect::temporary(authorize_url.as_str()).into_response(),
        build_cookie(GOOGLE_STATE_COOKIE, &nonce, state_cookie_ttl(&state)),
    )
}

/// Google Calendar connect callback
pub async fn google_callback(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(message) = query.provider_error() {
        return flow_error(&state, "google", &message);
    }
    let Some(code) = query.code.as_deref() else {
        return flow_error(&state, "google", "missing_code");
    };
    let Some(user) = user else {
        return login_redirect(&state);
    };
    let Some(google) = state.google() else {
        return flow_error(&state, "google", "missing_google_env");
    };

    // State must validate before any token exchange happens.
    match consume_state(
        &state,
        &user,
        "google",
        GOOGLE_STATE_COOKIE,
        &headers,
        query.state.as_deref(),
    )
    .await
    {
        Ok(true) => {}
        Ok(false) => return flow_error(&state, "google", "invalid_state"),
        Err(err) => {
            tracing::error!(error = %err, "OAuth state lookup failed");
            return flow_error(&state, "google", "invalid_state");
        }
    }

    let redirect_uri = format!(
        "{}/connect/google/callback",
        state.config.site_url_trimmed()
    );
    let tokens = match google.exchange_code(code, &redirect_uri).await {
        Ok(tokens) => tokens,
        Err(_) => return flow_error(&state, "google", "token_exchange_failed"),
    };

    let Some(access_token) = tokens.access_token.as_deref() else {
        return flow_error(&state, "google", "missing_access_token");
    };

    let calendar_id = match google.primary_calendar_id(access_token).await {
        Ok(Some(calendar_id)) => calendar_id,
        Ok(None) => return flow_error(&state, "google", "missing_calendar_id"),
        Err(_) => return flow_error(&state, "google", "calendar_list_failed"),
    };

    if let Err(err) = state
        .client_repo()
        .upsert_google(
            user.id,
            user.email.as_deref(),
            &calendar_id,
            tokens.refresh_token.as_deref(),
        )
        .await
    {
        tracing::error!(error = %err, user_id = %user.id, "Google connection upsert failed");
        return flow_error(&state, "google", "upsert_failed");
    }

    tracing::info!(user_id = %user.id, calendar_id = %calendar_id, "Google Calendar connected");

    with_cookie(
        flow_status(&state, "google", "connected"),
        clear_cookie(GOOGLE_STATE_COOKIE),
    )
}

// ---------------------------------------------------------------------------
// Square
// ---------------------------------------------------------------------------

/// Start the Square connect flow
pub async fn square_start(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
) -> Response {
    let Some(user) = user else {
        return login_redirect(&state);
    };
    let Some(square) = state.square() else {
        return flow_error(&state, "square", "missing_square_env");
    };

    let nonce = match issue_state(&state, user.id, "square").await {
        Ok(nonce) => nonce,
        Err(err) => {
            tracing::error!(error = %err, "Failed to persist OAuth state");
            return flow_error(&state, "square", "state_create_failed");
        }
    };

    let redirect_uri = format!(
        "{}/connect/square/callback",
        state.config.site_url_trimmed()
    );
    let authorize_url = match square.authorize_url(&redirect_uri, &nonce) {
        Ok(url) => url,
        Err(err) => {
            tracing::error!(error = %err, "Failed to build Square authorize URL");
            return flow_error(&state, "square", "authorize_url_failed");
        }
    };

    tracing::info!(user_id = %user.id, "Square connect flow initiated");

    with_cookie(
        Redirect::temporary(authorize_url.as_str()).into_response(),
        build_cookie(SQUARE_STATE_COOKIE, &nonce, state_cookie_ttl(&state)),
    )
}

/// Square connect callback
pub async fn square_callback(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(message) = query.provider_error() {
        return flow_error(&state, "square", &message);
    }
    let Some(code) = query.code.as_deref() else {
        return flow_error(&state, "square", "missing_code");
    };
    let Some(user) = user else {
        return login_redirect(&state);
    };
    let Some(square) = state.square() else {
        return flow_error(&state, "square", "missing_square_env");
    };

    match consume_state(
        &state,
        &user,
        "square",
        SQUARE_STATE_COOKIE,
        &headers,
        query.state.as_deref(),
    )
    .await
    {
        Ok(true) => {}
        Ok(false) => return flow_error(&state, "square", "state_mismatch"),
        Err(err) => {
            tracing::error!(error = %err, "OAuth state lookup failed");
            return flow_error(&state, "square", "state_mismatch");
        }
    }

    let tokens = match square.exchange_code(code).await {
        Ok(tokens) => tokens,
        Err(crate::providers::square::SquareError::TokenExchange { message }) => {
            return flow_error(&state, "square", &message);
        }
        Err(_) => return flow_error(&state, "square", "token_exchange_failed"),
    };

    let Some(access_token) = tokens.access_token.as_deref() else {
        return flow_error(&state, "square", "missing_access_token");
    };
    let Some(merchant_id) = tokens.merchant_id.as_deref() else {
        return flow_error(&state, "square", "missing_merchant_id");
    };

    let expires_at: Option<DateTimeWithTimeZone> = tokens
        .expires_at
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok());

    if let Err(err) = state
        .client_repo()
        .upsert_square(
            user.id,
            user.email.as_deref(),
            merchant_id,
            access_token,
            tokens.refresh_token.as_deref(),
            expires_at,
        )
        .await
    {
        tracing::error!(error = %err, user_id = %user.id, "Square connection upsert failed");
        return flow_error(&state, "square", "upsert_failed");
    }

    tracing::info!(user_id = %user.id, merchant_id = %merchant_id, "Square connected");

    with_cookie(
        flow_status(&state, "square", "connected"),
        clear_cookie(SQUARE_STATE_COOKIE),
    )
}

// ---------------------------------------------------------------------------
// Stripe Connect
// ---------------------------------------------------------------------------

/// Start Stripe Express onboarding. There is no OAuth dance here: the
/// account link IS the consent step, so no anti-forgery state is issued.
pub async fn stripe_start(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
) -> Response {
    let Some(user) = user else {
        return login_redirect(&state);
    };
    let Some(stripe) = state.stripe() else {
        return flow_error(&state, "stripe", "missing_stripe_env");
    };

    let clients = state.client_repo();
    let existing = match clients.find_by_user(&user.id).await {
        Ok(row) => row,
        Err(err) => {
            tracing::error!(error = %err, user_id = %user.id, "Client read failed");
            return flow_error(&state, "stripe", "read_failed");
        }
    };

    let account_id = match existing.and_then(|row| row.stripe_account_id) {
        Some(account_id) => account_id,
        None => {
            let account = match stripe
                .create_express_account(user.email.as_deref(), user.id)
                .await
            {
                Ok(account) => account,
                Err(err) => {
                    tracing::error!(error = %err, user_id = %user.id, "Stripe account creation failed");
                    return flow_error(&state, "stripe", "account_create_failed");
                }
            };

            if let Err(err) = clients.set_stripe_account(user.id, &account.id).await {
                tracing::error!(error = %err, user_id = %user.id, "Stripe account upsert failed");
                return flow_error(&state, "stripe", "upsert_failed");
            }

            account.id
        }
    };

    let refresh_url = page_url(
        &state,
        "/dashboard/connections",
        &[("provider", "stripe"), ("status", "refresh")],
    );
    let return_url = format!(
        "{}/connect/stripe/callback",
        state.config.site_url_trimmed()
    );

    match stripe
        .create_onboarding_link(&account_id, &refresh_url, &return_url)
        .await
    {
        Ok(link) => {
            tracing::info!(user_id = %user.id, account_id = %account_id, "Stripe onboarding started");
            Redirect::temporary(&link).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, user_id = %user.id, "Stripe account link failed");
            flow_error(&state, "stripe", "account_link_failed")
        }
    }
}

/// Stripe onboarding return. Retrieves the account and records whether
/// onboarding finished.
pub async fn stripe_callback(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
) -> Response {
    let Some(user) = user else {
        return login_redirect(&state);
    };
    let Some(stripe) = state.stripe() else {
        return flow_error(&state, "stripe", "missing_stripe_env");
    };

    let clients = state.client_repo();
    let row = match clients.find_by_user(&user.id).await {
        Ok(row) => row,
        Err(err) => {
            tracing::error!(error = %err, user_id = %user.id, "Client read failed");
            return flow_error(&state, "stripe", "read_failed");
        }
    };

    let Some(account_id) = row.and_then(|row| row.stripe_account_id) else {
        return flow_error(&state, "stripe", "missing_account");
    };

    let account = match stripe.retrieve_account(&account_id).await {
        Ok(account) => account,
        Err(err) => {
            tracing::error!(error = %err, account_id = %account_id, "Stripe account fetch failed");
            return flow_error(&state, "stripe", "account_fetch_failed");
        }
    };

    let complete = account.onboarding_complete();
    if let Err(err) = clients.set_stripe_status(user.id, complete).await {
        tracing::error!(error = %err, user_id = %user.id, "Stripe status upsert failed");
        return flow_error(&state, "stripe", "upsert_failed");
    }

    tracing::info!(user_id = %user.id, account_id = %account_id, complete, "Stripe onboarding returned");

    flow_status(
        &state,
        "stripe",
        if complete { "connected" } else { "incomplete" },
    )
}
