//! # OAuth State Repository
//!
//! Database operations for anti-forgery state management. States are
//! single-use: callback validation consumes the row it matched.

use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::oauth_state::{self, ActiveModel, Entity, Model};

/// Repository for OAuth state database operations
pub struct OAuthStateRepository {
    db: Arc<DatabaseConnection>,
}

impl OAuthStateRepository {
    /// Create a new OAuth state repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new OAuth state record
    pub async fn create(
        &self,
        user_id: Uuid,
        provider: &str,
        state: &str,
        expires_in_minutes: i64,
    ) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now();

        let new_state = ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            provider: Set(provider.to_string()),
            state: Set(state.to_string()),
            expires_at: Set(now + Duration::minutes(expires_in_minutes)),
            created_at: Set(now),
        };

        // Insert without RETURNING: SQLite cannot unpack a UUID primary key
        // from the insert result.
        let model = Model {
            id: new_state.id.clone().unwrap(),
            user_id,
            provider: provider.to_string(),
            state: state.to_string(),
            expires_at: new_state.expires_at.clone().unwrap(),
            created_at: now,
        };
        Entity::insert(new_state)
            .exec_without_returning(&*self.db)
            .await?;

        Ok(model)
    }

    /// Find a live (un-expired) state for a user/provider/state triple
    pub async fn find_live(
        &self,
        user_id: Uuid,
        provider: &str,
        state: &str,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(oauth_state::Column::UserId.eq(user_id))
            .filter(oauth_state::Column::Provider.eq(provider))
            .filter(oauth_state::Column::State.eq(state))
            .filter(oauth_state::Column::ExpiresAt.gt(Utc::now()))
            .one(&*self.db)
            .await
    }

    /// Find and consume a state (delete it after retrieval) so a replayed
    /// callback cannot validate twice
    pub async fn find_and_consume(
        &self,
        user_id: Uuid,
        provider: &str,
        state: &str,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        let oauth_state = self.find_live(user_id, provider, state).await?;

        if let Some(ref state_model) = oauth_state {
            let _ = Entity::delete_by_id(state_model.id).exec(&*self.db).await?;
        }

        Ok(oauth_state)
    }

    /// Clean up expired OAuth states
    pub async fn cleanup_expired(&self) -> Result<u64, sea_orm::DbErr> {
        let result = Entity::delete_many()
            .filter(oauth_state::Column::ExpiresAt.lt(Utc::now()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
