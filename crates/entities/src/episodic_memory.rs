use sea_orm::entity::prelude::*;

/// LLM-produced narrative of a MemCell. `user_id` NULL means group scope.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "episodic_memory")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  /// Weak links back to the MemCells this episode narrates.
  pub parent_memcell_ids: Vec<Uuid>,
  pub user_id: Option<String>,
  pub group_id: String,
  pub timestamp: DateTimeWithTimeZone,
  pub subject: String,
  pub episode: String,
  pub summary: String,
  pub embedding: PgVector,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
