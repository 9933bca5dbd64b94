use chrono::{DateTime, Utc};
use sea_orm::{
  ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
  Set,
};
use stratamem_entities::conversation_status;
use stratamem_shared::AppError;
use uuid::Uuid;

/// Record message arrival for a group. `last_message_at` only ever moves
/// forward; the ingestion pipeline is the sole writer and runs under the
/// per-group lock.
pub async fn touch_conversation(
  group_id: &str,
  last_message_at: DateTime<Utc>,
  awaiting_boundary: bool,
  db: &DatabaseConnection,
) -> Result<(), AppError> {
  let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

  let existing = conversation_status::Entity::find()
    .filter(conversation_status::Column::GroupId.eq(group_id))
    .one(db)
    .await?;

  if let Some(model) = existing {
    let advanced = last_message_at.max(model.last_message_at.with_timezone(&Utc));
    let mut active = model.into_active_model();
    active.last_message_at = Set(advanced.into());
    active.awaiting_boundary = Set(awaiting_boundary);
    active.updated_at = Set(now);
    active.update(db).await?;
  } else {
    let active = conversation_status::ActiveModel {
      id: Set(Uuid::now_v7()),
      group_id: Set(group_id.to_owned()),
      last_message_at: Set(last_message_at.into()),
      last_memcell_at: Set(None),
      awaiting_boundary: Set(awaiting_boundary),
      updated_at: Set(now),
    };
    active.insert(db).await?;
  }

  Ok(())
}

/// Record a completed MemCell cut for a group.
pub async fn mark_memcell_extracted(
  group_id: &str,
  memcell_at: DateTime<Utc>,
  db: &DatabaseConnection,
) -> Result<(), AppError> {
  let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

  let existing = conversation_status::Entity::find()
    .filter(conversation_status::Column::GroupId.eq(group_id))
    .one(db)
    .await?;

  if let Some(model) = existing {
    let advanced = memcell_at.max(model.last_message_at.with_timezone(&Utc));
    let mut active = model.into_active_model();
    active.last_message_at = Set(advanced.into());
    active.last_memcell_at = Set(Some(memcell_at.into()));
    active.awaiting_boundary = Set(false);
    active.updated_at = Set(now);
    active.update(db).await?;
  } else {
    let active = conversation_status::ActiveModel {
      id: Set(Uuid::now_v7()),
      group_id: Set(group_id.to_owned()),
      last_message_at: Set(memcell_at.into()),
      last_memcell_at: Set(Some(memcell_at.into())),
      awaiting_boundary: Set(false),
      updated_at: Set(now),
    };
    active.insert(db).await?;
  }

  Ok(())
}
