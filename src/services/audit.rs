use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use uuid::Uuid;

use crate::entities::activity_log;
use crate::errors::ServiceError;

/// Appends an activity_log row. Called from inside workflow transactions so
/// the audit entry commits or rolls back with the writes it describes.
pub async fn log_activity<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    action: &str,
    entity_type: &str,
    entity_id: Uuid,
    details: Option<serde_json::Value>,
) -> Result<(), ServiceError> {
    let entry = activity_log::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        action: Set(action.to_string()),
        entity_type: Set(entity_type.to_string()),
        entity_id: Set(entity_id),
        details: Set(details.map(|d| d.to_string())),
        created_at: Set(Utc::now()),
    };
    entry.insert(conn).await?;
    Ok(())
}
