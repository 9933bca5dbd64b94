use sea_orm::entity::prelude::*;

/// One atomic fact from an episode's per-user event log. The domain-level
/// event log carries parallel fact/embedding vectors; each fact lands in
/// its own row with `fact_index` preserving the original order.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "event_log")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  /// Weak link to the source episodic memory.
  pub parent_event_id: Uuid,
  pub user_id: String,
  pub group_id: String,
  pub time: DateTimeWithTimeZone,
  pub fact_index: i32,
  pub atomic_fact: String,
  pub embedding: PgVector,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
