use crate::{
    db::DbPool,
    entities::store_setting,
    errors::ServiceError,
    services::audit,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PutSettingRequest {
    #[validate(length(min = 1, max = 128, message = "Key must be between 1 and 128 characters"))]
    pub key: String,
    pub value: String,
}

/// Store-level key/value settings (store name, currency, receipt footer).
#[derive(Clone)]
pub struct SettingsService {
    db_pool: Arc<DbPool>,
}

impl SettingsService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn get_setting(
        &self,
        key: &str,
    ) -> Result<Option<store_setting::Model>, ServiceError> {
        let db = &*self.db_pool;
        Ok(store_setting::Entity::find_by_id(key.to_string())
            .one(db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn list_settings(&self) -> Result<Vec<store_setting::Model>, ServiceError> {
        let db = &*self.db_pool;
        Ok(store_setting::Entity::find()
            .order_by_asc(store_setting::Column::Key)
            .all(db)
            .await?)
    }

    /// Inserts or overwrites a setting.
    #[instrument(skip(self, request), fields(key = %request.key))]
    pub async fn put_setting(
        &self,
        user_id: Uuid,
        request: PutSettingRequest,
    ) -> Result<store_setting::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        let now = Utc::now();

        let existing = store_setting::Entity::find_by_id(request.key.clone())
            .one(db)
            .await?;
        let saved = match existing {
            Some(model) => {
                let mut active: store_setting::ActiveModel = model.into();
                active.value = Set(request.value);
                active.updated_at = Set(now);
                active.update(db).await?
            }
            None => {
                store_setting::ActiveModel {
                    key: Set(request.key.clone()),
                    value: Set(request.value),
                    updated_at: Set(now),
                }
                .insert(db)
                .await?
            }
        };

        audit::log_activity(
            db,
            user_id,
            "settings.put",
            "store_setting",
            Uuid::nil(),
            Some(serde_json::json!({ "key": saved.key.clone() })),
        )
        .await?;

        Ok(saved)
    }
}
