//! # Settings Handlers
//!
//! Authenticated updates to the coach's routing fields: the Square payment
//! link and the chatbot key/URL forwarded with webhook events.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::auth::CurrentUser;
use crate::error::{ApiError, validation_error};
use crate::repositories::client::SettingsPatch;
use crate::server::AppState;

/// Settings update request. Absent fields are left unchanged; blank strings
/// clear the field.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SettingsRequest {
    pub square_payment_link: Option<String>,
    pub chatbot_key: Option<String>,
    pub chatbot_url: Option<String>,
}

/// Settings update response carrying the stored values
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SettingsResponse {
    pub ok: bool,
    pub square_payment_link: Option<String>,
    pub chatbot_key: Option<String>,
    pub chatbot_url: Option<String>,
}

fn normalize(value: Option<String>) -> Option<Option<String>> {
    value.map(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn require_http_url(field: &str, value: &str) -> Result<(), ApiError> {
    let parsed = Url::parse(value).map_err(|_| {
        validation_error(
            "Invalid URL",
            serde_json::json!({ field: "must be a valid URL" }),
        )
    })?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(validation_error(
            "Invalid URL",
            serde_json::json!({ field: "must use http or https" }),
        ));
    }

    Ok(())
}

/// Update the caller's routing settings
#[utoipa::path(
    put,
    path = "/api/settings",
    request_body = SettingsRequest,
    responses(
        (status = 200, description = "Settings stored", body = SettingsResponse),
        (status = 400, description = "Invalid field value", body = ApiError),
        (status = 401, description = "No active session", body = ApiError)
    ),
    tag = "settings"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<SettingsRequest>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let patch = SettingsPatch {
        square_payment_link: normalize(request.square_payment_link),
        chatbot_key: normalize(request.chatbot_key),
        chatbot_url: normalize(request.chatbot_url),
    };

    if let Some(Some(ref link)) = patch.square_payment_link {
        require_http_url("square_payment_link", link)?;
    }
    if let Some(Some(ref chatbot_url)) = patch.chatbot_url {
        require_http_url("chatbot_url", chatbot_url)?;
    }

    let clients = state.client_repo();
    clients
        .ensure(user.id, user.email.as_deref())
        .await
        .map_err(|err| {
            tracing::error!(error = %err, user_id = %user.id, "Client bootstrap failed");
            ApiError::from(err)
        })?;

    let updated = clients.update_settings(user.id, patch).await.map_err(|err| {
        tracing::error!(error = %err, user_id = %user.id, "Settings update failed");
        ApiError::from(err)
    })?;

    Ok(Json(SettingsResponse {
        ok: true,
        square_payment_link: updated.square_payment_link,
        chatbot_key: updated.chatbot_key,
        chatbot_url: updated.chatbot_url,
    }))
}
