//! # Webhook Handlers
//!
//! Receiver for Square webhook events: verify the signature against the raw
//! body, resolve the owning client, and forward a normalized event to the
//! external automation endpoint.
//!
//! Each stage fails closed except the unknown-merchant case, which answers
//! 200 so Square's retry policy does not hammer an event nobody owns.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::server::AppState;
use crate::webhook_verification::{SQUARE_SIGNATURE_HEADER, verify_square_signature};

/// Webhook acknowledgement body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub ok: bool,
    /// Set when the event was accepted but deliberately not forwarded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl WebhookAck {
    fn ok() -> Self {
        Self {
            ok: true,
            ignored: None,
            reason: None,
        }
    }

    fn ignored(reason: &str) -> Self {
        Self {
            ok: true,
            ignored: Some(true),
            reason: Some(reason.to_string()),
        }
    }
}

/// Normalized event forwarded to the automation endpoint
#[derive(Debug, Serialize)]
struct ForwardedEvent {
    source: &'static str,
    received_at: String,
    merchant_id: String,
    event_type: Option<String>,
    event_id: Option<String>,
    client: ForwardedClient,
    /// Full raw Square payload for downstream inspection
    square: JsonValue,
}

/// Owner routing fields included in the forwarded event
#[derive(Debug, Serialize)]
struct ForwardedClient {
    user_id: String,
    email: Option<String>,
    google_calendar_id: Option<String>,
    chatbot_key: Option<String>,
    chatbot_url: Option<String>,
    square_payment_link: Option<String>,
    square_merchant_id: Option<String>,
}

fn missing_env(need: &[&str]) -> ApiError {
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "MISSING_ENV",
        "Webhook receiver is not fully configured",
    )
    .with_details(serde_json::json!({ "need": need }))
}

/// Square webhook receiver
#[utoipa::path(
    post,
    path = "/webhooks/square",
    request_body(content = serde_json::Value, description = "Raw Square event JSON"),
    responses(
        (status = 200, description = "Event processed or deliberately ignored", body = WebhookAck),
        (status = 400, description = "Malformed JSON or missing merchant id", body = ApiError),
        (status = 401, description = "Invalid signature", body = ApiError),
        (status = 500, description = "Missing configuration or store failure", body = ApiError),
        (status = 502, description = "Forward target rejected the event", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn square_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let Some(signing_key) = state.config.square_webhook_signature_key.as_deref() else {
        return Err(missing_env(&["PORTAL_SQUARE_WEBHOOK_SIGNATURE_KEY"]));
    };

    // Verify against the raw bytes before any parsing; the notification URL
    // is part of the signed input.
    let provided_signature = headers
        .get(SQUARE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let notification_url = state.config.square_notification_url();

    if let Err(err) =
        verify_square_signature(&body, provided_signature, signing_key, &notification_url)
    {
        tracing::warn!(error = %err, "Square webhook signature rejected");
        return Err(ApiError::new(
            err.status_code(),
            "INVALID_SIGNATURE",
            "Webhook signature verification failed",
        ));
    }

    // Only now is the body parsed.
    let payload: JsonValue = serde_json::from_slice(&body).map_err(|err| {
        tracing::warn!(error = %err, "Square webhook body is not valid JSON");
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "INVALID_JSON",
            "Webhook body is not valid JSON",
        )
    })?;

    // Square places the merchant id top-level or under `data`.
    let merchant_id = payload
        .get("merchant_id")
        .and_then(JsonValue::as_str)
        .or_else(|| {
            payload
                .get("data")
                .and_then(|data| data.get("merchant_id"))
                .and_then(JsonValue::as_str)
        })
        .map(str::to_string);

    let Some(merchant_id) = merchant_id else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "MISSING_MERCHANT_ID",
            "Webhook payload carries no merchant id",
        ));
    };

    let client = state
        .client_repo()
        .find_by_merchant_id(&merchant_id)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, merchant_id = %merchant_id, "Client lookup failed");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "LOOKUP_FAILED",
                "Failed to resolve the owning account",
            )
        })?;

    let Some(client) = client else {
        // 200 on purpose: a 4xx/5xx would make Square retry an event that
        // will never resolve to an account.
        tracing::info!(merchant_id = %merchant_id, "Ignoring event for unknown merchant");
        return Ok(Json(WebhookAck::ignored("unknown_merchant")));
    };

    let Some(forward_url) = state.config.forward_webhook_url.as_deref() else {
        return Err(missing_env(&["PORTAL_FORWARD_WEBHOOK_URL"]));
    };

    let event_type = payload
        .get("type")
        .or_else(|| payload.get("event_type"))
        .and_then(JsonValue::as_str)
        .map(str::to_string);
    let event_id = payload
        .get("event_id")
        .or_else(|| payload.get("id"))
        .and_then(JsonValue::as_str)
        .map(str::to_string);

    let forward_body = ForwardedEvent {
        source: "square_webhook",
        received_at: Utc::now().to_rfc3339(),
        merchant_id: merchant_id.clone(),
        event_type,
        event_id,
        client: ForwardedClient {
            user_id: client.user_id.to_string(),
            email: client.email,
            google_calendar_id: client.google_calendar_id,
            chatbot_key: client.chatbot_key,
            chatbot_url: client.chatbot_url,
            square_payment_link: client.square_payment_link,
            square_merchant_id: client.square_merchant_id,
        },
        square: payload,
    };

    let response = state
        .http
        .post(forward_url)
        .json(&forward_body)
        .send()
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "Webhook forward request failed");
            ApiError::new(
                StatusCode::BAD_GATEWAY,
                "FORWARD_FAILED",
                "Failed to reach the automation endpoint",
            )
        })?;

    let status = response.status();
    if !status.is_success() {
        let upstream_body = response.text().await.unwrap_or_default();
        tracing::error!(
            status = status.as_u16(),
            body = %upstream_body,
            "Webhook forward target rejected the event"
        );
        return Err(ApiError::new(
            StatusCode::BAD_GATEWAY,
            "FORWARD_FAILED",
            "Automation endpoint rejected the event",
        )
        .with_details(serde_json::json!({
            "status": status.as_u16(),
            "body": upstream_body,
        })));
    }

    tracing::info!(merchant_id = %merchant_id, "Square event forwarded");
    Ok(Json(WebhookAck::ok()))
}
