//! Client repository for database operations
//!
//! Encapsulates SeaORM operations for the `clients` table. Every write is an
//! upsert keyed on `user_id`; there is no optimistic concurrency check, so
//! last-writer-wins is the store's policy.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::client::{self, Entity as Client};

/// Fields settable through the settings endpoint. An outer `Some` means the
/// field is part of the patch; an inner `None` clears it.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub square_payment_link: Option<Option<String>>,
    pub chatbot_key: Option<Option<String>>,
    pub chatbot_url: Option<Option<String>>,
}

/// Repository for client database operations
#[derive(Debug, Clone)]
pub struct ClientRepository {
    db: Arc<DatabaseConnection>,
}

impl ClientRepository {
    /// Creates a new ClientRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds a client row by its user id
    pub async fn find_by_user(&self, user_id: &Uuid) -> Result<Option<client::Model>> {
        Ok(Client::find_by_id(*user_id).one(&*self.db).await?)
    }

    /// Finds the client row owning a Square merchant id
    pub async fn find_by_merchant_id(&self, merchant_id: &str) -> Result<Option<client::Model>> {
        Ok(Client::find()
            .filter(client::Column::SquareMerchantId.eq(merchant_id))
            .one(&*self.db)
            .await?)
    }

    /// Lazily bootstraps the row for a user, capturing the session email.
    /// Existing rows are left untouched apart from a missing email.
    pub async fn ensure(&self, user_id: Uuid, email: Option<&str>) -> Result<client::Model> {
        if let Some(existing) = self.find_by_user(&user_id).await? {
            if existing.email.is_none()
                && let Some(email) = email
            {
                let mut model: client::ActiveModel = existing.into();
                model.email = Set(Some(email.to_string()));
                model.updated_at = Set(Utc::now().into());
                return Ok(model.update(&*self.db).await?);
            }
            return Ok(existing);
        }

        self.upsert_with(user_id, email, |_| {}).await
    }

    /// Records a completed Google connection
    pub async fn upsert_google(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        calendar_id: &str,
        refresh_token: Option<&str>,
    ) -> Result<client::Model> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        self.upsert_with(user_id, email, |model| {
            model.google_calendar_id = Set(Some(calendar_id.to_string()));
            model.google_refresh_token = Set(refresh_token.map(str::to_string));
            model.google_connected_at = Set(Some(now));
        })
        .await
    }

    /// Records a completed Square connection
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_square(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        merchant_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTimeWithTimeZone>,
    ) -> Result<client::Model> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        self.upsert_with(user_id, email, |model| {
            model.square_merchant_id = Set(Some(merchant_id.to_string()));
            model.square_access_token = Set(Some(access_token.to_string()));
            model.square_refresh_token = Set(refresh_token.map(str::to_string));
            model.square_expires_at = Set(expires_at);
            model.square_connected_at = Set(Some(now));
        })
        .await
    }

    /// Stores a freshly created Stripe account id
    pub async fn set_stripe_account(
        &self,
        user_id: Uuid,
        account_id: &str,
    ) -> Result<client::Model> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        self.upsert_with(user_id, None, |model| {
            model.stripe_account_id = Set(Some(account_id.to_string()));
            model.stripe_connected_at = Set(Some(now));
        })
        .await
    }

    /// Records the outcome of a Stripe onboarding return
    pub async fn set_stripe_status(&self, user_id: Uuid, complete: bool) -> Result<client::Model> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        self.upsert_with(user_id, None, |model| {
            model.stripe_onboarding_complete = Set(complete);
            model.stripe_connected_at = Set(Some(now));
        })
        .await
    }

    /// Applies a settings patch to an existing row
    pub async fn update_settings(
        &self,
        user_id: Uuid,
        patch: SettingsPatch,
    ) -> Result<client::Model> {
        let existing = self
            .find_by_user(&user_id)
            .await?
            .ok_or_else(|| anyhow!("client row for user '{}' not found", user_id))?;

        let mut model: client::ActiveModel = existing.into();
        if let Some(payment_link) = patch.square_payment_link {
            model.square_payment_link = Set(payment_link);
        }
        if let Some(chatbot_key) = patch.chatbot_key {
            model.chatbot_key = Set(chatbot_key);
        }
        if let Some(chatbot_url) = patch.chatbot_url {
            model.chatbot_url = Set(chatbot_url);
        }
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    /// Insert-or-update keyed on `user_id`. `apply` sets the provider fields
    /// being written; untouched fields keep their current values.
    async fn upsert_with<F>(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        apply: F,
    ) -> Result<client::Model>
    where
        F: FnOnce(&mut client::ActiveModel),
    {
        let now: DateTimeWithTimeZone = Utc::now().into();

        match self.find_by_user(&user_id).await? {
            Some(existing) => {
                let mut model: client::ActiveModel = existing.into();
                if let Some(email) = email {
                    model.email = Set(Some(email.to_string()));
                }
                model.updated_at = Set(now);
                apply(&mut model);
                Ok(model.update(&*self.db).await?)
            }
            None => {
                let mut model = client::ActiveModel {
                    user_id: Set(user_id),
                    email: Set(email.map(str::to_string)),
                    stripe_onboarding_complete: Set(false),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                apply(&mut model);

                // Insert without RETURNING, then re-fetch: SQLite cannot
                // unpack a non-integer primary key from the insert result.
                Client::insert(model)
                    .exec_without_returning(&*self.db)
                    .await?;

                self.find_by_user(&user_id)
                    .await?
                    .ok_or_else(|| anyhow!("client row not persisted"))
            }
        }
    }
}
