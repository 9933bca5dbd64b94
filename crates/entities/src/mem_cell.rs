use sea_orm::entity::prelude::*;

/// A detected conversational episode. `id`, `timestamp` and
/// `original_data` are immutable once persisted; `episode` and `subject`
/// are back-filled by the extraction worker.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "mem_cell")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub group_id: String,
  pub group_name: Option<String>,
  pub participants: Vec<String>,
  /// `max(created_at)` over the cell's messages.
  pub timestamp: DateTimeWithTimeZone,
  pub kind: String,
  /// The raw messages the cell was cut from, as a JSON array.
  pub original_data: Json,
  pub summary: Option<String>,
  pub episode: Option<String>,
  pub subject: Option<String>,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
