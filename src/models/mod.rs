//! # Data Models
//!
//! This module contains all the data models used throughout the coach portal.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod client;
pub mod oauth_state;

pub use client::Entity as Client;
pub use oauth_state::Entity as OAuthState;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "coach-portal".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
