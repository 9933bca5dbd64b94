use sea_orm_migration::{
  prelude::*,
  schema::{boolean, json_binary, text, timestamp_with_time_zone, timestamp_with_time_zone_null, uuid},
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(ConversationMeta::Table)
          .if_not_exists()
          .col(uuid(ConversationMeta::Id).primary_key())
          .col(text(ConversationMeta::GroupId).unique_key())
          .col(text(ConversationMeta::Scene))
          .col(json_binary(ConversationMeta::SceneDesc))
          .col(text(ConversationMeta::Name))
          .col(text(ConversationMeta::Description))
          .col(text(ConversationMeta::Version))
          .col(timestamp_with_time_zone(ConversationMeta::ConversationCreatedAt))
          .col(text(ConversationMeta::DefaultTimezone))
          .col(json_binary(ConversationMeta::UserDetails))
          .col(ColumnDef::new(ConversationMeta::Tags).array(ColumnType::Text).not_null())
          .col(timestamp_with_time_zone(ConversationMeta::CreatedAt))
          .col(timestamp_with_time_zone(ConversationMeta::UpdatedAt))
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(ConversationStatus::Table)
          .if_not_exists()
          .col(uuid(ConversationStatus::Id).primary_key())
          .col(text(ConversationStatus::GroupId).unique_key())
          .col(timestamp_with_time_zone(ConversationStatus::LastMessageAt))
          .col(timestamp_with_time_zone_null(ConversationStatus::LastMemcellAt))
          .col(boolean(ConversationStatus::AwaitingBoundary))
          .col(timestamp_with_time_zone(ConversationStatus::UpdatedAt))
          .to_owned(),
      )
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(ConversationStatus::Table).to_owned())
      .await?;
    manager
      .drop_table(Table::drop().table(ConversationMeta::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum ConversationMeta {
  Table,

  Id,
  GroupId,
  Scene,
  SceneDesc,
  Name,
  Description,
  Version,
  ConversationCreatedAt,
  DefaultTimezone,
  UserDetails,
  Tags,
  CreatedAt,
  UpdatedAt,
}

#[derive(Iden)]
pub enum ConversationStatus {
  Table,

  Id,
  GroupId,
  LastMessageAt,
  LastMemcellAt,
  AwaitingBoundary,
  UpdatedAt,
}
