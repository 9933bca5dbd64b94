use sea_orm::entity::prelude::*;

/// Ingestion progress per conversation. Mutated only by the ingestion
/// pipeline; `last_message_at` advances monotonically.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "conversation_status")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  #[sea_orm(unique)]
  pub group_id: String,
  pub last_message_at: DateTimeWithTimeZone,
  pub last_memcell_at: Option<DateTimeWithTimeZone>,
  pub awaiting_boundary: bool,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
