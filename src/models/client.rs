//! Client entity model
//!
//! SeaORM entity for the `clients` table: one row per coach, keyed by the
//! identity-provider user id, holding per-provider connection fields.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client entity: a coach account with its provider connections.
///
/// `user_id` is the one correlation key across all providers; rows are
/// upserted on it and never deleted. Provider fields are independently
/// overwritten on reconnect.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "clients")]
pub struct Model {
    /// Identity-provider user id (primary key, set once at first login)
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,

    /// Contact email captured from the session
    pub email: Option<String>,

    /// Selected Google calendar resource id
    pub google_calendar_id: Option<String>,

    /// Long-lived Google refresh token (opaque secret)
    pub google_refresh_token: Option<String>,

    pub google_connected_at: Option<DateTimeWithTimeZone>,

    /// Square merchant id; webhook events are correlated through it
    pub square_merchant_id: Option<String>,

    /// Square access token (opaque secret)
    pub square_access_token: Option<String>,

    /// Square refresh token (opaque secret)
    pub square_refresh_token: Option<String>,

    pub square_expires_at: Option<DateTimeWithTimeZone>,

    pub square_connected_at: Option<DateTimeWithTimeZone>,

    /// User-supplied Square payment link
    pub square_payment_link: Option<String>,

    /// Stripe Connect Express account id
    pub stripe_account_id: Option<String>,

    /// Whether Stripe onboarding finished (details submitted, charges enabled)
    pub stripe_onboarding_complete: bool,

    pub stripe_connected_at: Option<DateTimeWithTimeZone>,

    /// Automation routing: chatbot credential
    pub chatbot_key: Option<String>,

    /// Automation routing: chatbot endpoint
    pub chatbot_url: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
