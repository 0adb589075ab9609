//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the coach portal.

pub mod connect;
pub mod session;
pub mod settings;
pub mod webhooks;

use axum::{extract::State, response::Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::ServiceInfo;
use crate::server::AppState;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Health response: liveness plus configuration presence. Only public URLs
/// and `_SET` booleans are exposed, never secret values.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
    /// Server time, RFC 3339
    pub ts: String,
    /// Presence booleans and public URLs for each configuration input
    pub env: serde_json::Value,
}

/// Health and configuration-presence endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health and config presence", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        ts: Utc::now().to_rfc3339(),
        env: state.config.env_presence(),
    })
}
