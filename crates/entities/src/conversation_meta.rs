use sea_orm::entity::prelude::*;

/// One row per conversation; describes the scene and the participants.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "conversation_meta")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  #[sea_orm(unique)]
  pub group_id: String,
  pub scene: String,
  pub scene_desc: Json,
  pub name: String,
  pub description: String,
  pub version: String,
  pub conversation_created_at: DateTimeWithTimeZone,
  pub default_timezone: String,
  /// user_id → { full_name, role, extra }
  pub user_details: Json,
  pub tags: Vec<String>,
  pub created_at: DateTimeWithTimeZone,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
