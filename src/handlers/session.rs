//! # Session Handlers
//!
//! Identity-provider auth callback (code-for-session exchange) and the
//! `whoami` probe. Session issuance itself belongs to the identity provider;
//! this service only exchanges codes and stores the resulting token in a
//! browser cookie.

use axum::{
    extract::{Query, State},
    http::{HeaderValue, header::SET_COOKIE},
    response::{IntoResponse, Json, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{OptionalUser, SESSION_COOKIE, SessionUser, build_cookie};
use crate::server::AppState;

/// Fallback session cookie lifetime when the provider reports none: 7 days.
const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
}

/// Identity-provider redirect target: exchanges the auth code for a session.
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<AuthCallbackQuery>,
) -> Response {
    let site = state.config.site_url_trimmed();

    let Some(code) = query.code.as_deref() else {
        return Redirect::temporary(&format!("{}/login?error=missing_code", site)).into_response();
    };

    let token = match state.sessions.exchange_code(code).await {
        Ok(token) => token,
        Err(err) => {
            tracing::warn!(error = %err, "Session code exchange failed");
            return Redirect::temporary(&format!("{}/login?error=exchange_failed", site))
                .into_response();
        }
    };

    // Bootstrap the client row so the dashboard has something to render.
    // Best-effort: a store hiccup here must not break login.
    match state.sessions.resolve_user(&token.access_token).await {
        Ok(Some(user)) => {
            if let Err(err) = state
                .client_repo()
                .ensure(user.id, user.email.as_deref())
                .await
            {
                tracing::warn!(error = %err, user_id = %user.id, "Client bootstrap failed");
            }
        }
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(error = %err, "Could not resolve freshly issued session");
        }
    }

    let max_age = token.expires_in.unwrap_or(DEFAULT_SESSION_TTL_SECS);
    let cookie = build_cookie(SESSION_COOKIE, &token.access_token, max_age);

    let mut response = Redirect::temporary(&format!("{}/dashboard", site)).into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

/// Whoami response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WhoamiResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub user: Option<SessionUser>,
}

/// Session probe: reports the current user, or that there is none.
#[utoipa::path(
    get,
    path = "/whoami",
    responses(
        (status = 200, description = "Current session state", body = WhoamiResponse)
    ),
    tag = "session"
)]
pub async fn whoami(OptionalUser(user): OptionalUser) -> Json<WhoamiResponse> {
    match user {
        Some(user) => Json(WhoamiResponse {
            ok: true,
            error: None,
            user: Some(user),
        }),
        None => Json(WhoamiResponse {
            ok: false,
            error: Some("not_logged_in".to_string()),
            user: None,
        }),
    }
}
