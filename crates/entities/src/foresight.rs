use sea_orm::entity::prelude::*;

/// Prediction or expectation extracted from an episode, with an optional
/// validity window used to filter at retrieval time.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "foresight")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  /// Weak link to the source episodic memory.
  pub parent_event_id: Uuid,
  pub user_id: Option<String>,
  pub group_id: String,
  pub content: String,
  pub evidence: Option<String>,
  pub start_time: Option<DateTimeWithTimeZone>,
  pub end_time: Option<DateTimeWithTimeZone>,
  pub embedding: PgVector,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
