use sea_orm::entity::prelude::*;

/// Serialized per-group incremental clustering state. Best-effort
/// durability: clusters can be rebuilt from episodic embeddings.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cluster_state")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub group_id: String,
  pub state: Json,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
