//! # OAuth State Model
//!
//! This module contains the OAuth state entity for storing anti-forgery
//! state tokens issued at connect-start.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use uuid::Uuid;

/// OAuth state entity: an ephemeral, single-use token correlating an
/// authorization request with its callback.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_states")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// User that started the flow
    pub user_id: Uuid,

    /// Provider name (e.g., "google", "square")
    pub provider: String,

    /// Random nonce issued for CSRF protection
    pub state: String,

    /// Expiration timestamp; expired states never validate
    pub expires_at: chrono::DateTime<chrono::Utc>,

    /// When the state was created
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
