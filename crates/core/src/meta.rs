use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
  ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
  Set,
};
use serde::{Deserialize, Serialize};
use stratamem_entities::conversation_meta;
use stratamem_shared::{AppError, Scene};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct UserDetail {
  pub full_name: String,
  pub role: String,
  #[serde(default)]
  pub extra: serde_json::Value,
}

/// Upsert payload for a conversation's metadata, keyed by `group_id`.
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct ConversationMetaRecord {
  pub version: String,
  pub scene: Scene,
  #[serde(default)]
  pub scene_desc: serde_json::Value,
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub group_id: String,
  pub created_at: DateTime<Utc>,
  pub default_timezone: String,
  #[serde(default)]
  pub user_details: HashMap<String, UserDetail>,
  #[serde(default)]
  pub tags: Vec<String>,
}

fn scene_to_str(scene: Scene) -> &'static str {
  match scene {
    Scene::Assistant => "assistant",
    Scene::Companion => "companion",
    Scene::GroupChat => "group_chat",
    Scene::Other => "other",
  }
}

fn scene_from_str(raw: &str) -> Scene {
  match raw {
    "companion" => Scene::Companion,
    "group_chat" => Scene::GroupChat,
    "other" => Scene::Other,
    _ => Scene::Assistant,
  }
}

/// Insert or update the meta row for `record.group_id`.
pub async fn upsert_conversation_meta(
  record: &ConversationMetaRecord,
  db: &DatabaseConnection,
) -> Result<conversation_meta::Model, AppError> {
  let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
  let user_details = serde_json::to_value(&record.user_details)?;

  let existing = conversation_meta::Entity::find()
    .filter(conversation_meta::Column::GroupId.eq(&record.group_id))
    .one(db)
    .await?;

  let model = if let Some(model) = existing {
    let mut active = model.into_active_model();
    active.scene = Set(scene_to_str(record.scene).to_owned());
    active.scene_desc = Set(record.scene_desc.clone());
    active.name = Set(record.name.clone());
    active.description = Set(record.description.clone());
    active.version = Set(record.version.clone());
    active.conversation_created_at = Set(record.created_at.into());
    active.default_timezone = Set(record.default_timezone.clone());
    active.user_details = Set(user_details);
    active.tags = Set(record.tags.clone());
    active.updated_at = Set(now);
    active.update(db).await?
  } else {
    let active = conversation_meta::ActiveModel {
      id: Set(Uuid::now_v7()),
      group_id: Set(record.group_id.clone()),
      scene: Set(scene_to_str(record.scene).to_owned()),
      scene_desc: Set(record.scene_desc.clone()),
      name: Set(record.name.clone()),
      description: Set(record.description.clone()),
      version: Set(record.version.clone()),
      conversation_created_at: Set(record.created_at.into()),
      default_timezone: Set(record.default_timezone.clone()),
      user_details: Set(user_details),
      tags: Set(record.tags.clone()),
      created_at: Set(now),
      updated_at: Set(now),
    };
    active.insert(db).await?
  };

  Ok(model)
}

/// Scene for a group; defaults to assistant when no meta row exists.
pub async fn get_scene(group_id: &str, db: &DatabaseConnection) -> Result<Scene, AppError> {
  let meta = conversation_meta::Entity::find()
    .filter(conversation_meta::Column::GroupId.eq(group_id))
    .one(db)
    .await?;

  Ok(meta.map_or(Scene::Assistant, |m| scene_from_str(&m.scene)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scene_round_trips_through_storage_strings() {
    for scene in [Scene::Assistant, Scene::Companion, Scene::GroupChat, Scene::Other] {
      assert_eq!(scene_from_str(scene_to_str(scene)), scene);
    }
  }

  #[test]
  fn unknown_scene_defaults_to_assistant() {
    assert_eq!(scene_from_str("definitely-not-a-scene"), Scene::Assistant);
  }
}
