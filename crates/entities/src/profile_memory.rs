use sea_orm::entity::prelude::*;

/// Per-(user, group) structured summary, version-chained. For each
/// `(user_id, group_id)` exactly one row has `is_latest = true`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "profile_memory")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub user_id: String,
  pub group_id: String,
  pub version: String,
  pub is_latest: bool,
  pub scenario: String,
  pub summary: String,
  pub interests: Json,
  pub skills: Json,
  pub traits: Json,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
