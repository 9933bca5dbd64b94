use sea_orm::entity::prelude::*;

/// Atomic fact or preference extracted from an episode, always attributed
/// to one user. `start_time`/`end_time` bound the fact's validity.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "semantic_memory")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  /// Weak link to the source episodic memory.
  pub parent_event_id: Uuid,
  pub user_id: String,
  pub group_id: String,
  pub content: String,
  pub evidence: Option<String>,
  pub start_time: Option<DateTimeWithTimeZone>,
  pub end_time: Option<DateTimeWithTimeZone>,
  pub duration_days: Option<i32>,
  pub embedding: PgVector,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
