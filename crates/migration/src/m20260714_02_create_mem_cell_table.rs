use sea_orm_migration::{
  prelude::*,
  schema::{json_binary, text, text_null, timestamp_with_time_zone, uuid},
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(MemCell::Table)
          .if_not_exists()
          .col(uuid(MemCell::Id).primary_key())
          .col(text(MemCell::GroupId))
          .col(text_null(MemCell::GroupName))
          .col(ColumnDef::new(MemCell::Participants).array(ColumnType::Text).not_null())
          .col(timestamp_with_time_zone(MemCell::Timestamp))
          .col(text(MemCell::Kind))
          .col(json_binary(MemCell::OriginalData))
          .col(text_null(MemCell::Summary))
          .col(text_null(MemCell::Episode))
          .col(text_null(MemCell::Subject))
          .col(timestamp_with_time_zone(MemCell::CreatedAt))
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_mem_cell_group_timestamp")
          .table(MemCell::Table)
          .col(MemCell::GroupId)
          .col(MemCell::Timestamp)
          .to_owned(),
      )
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(MemCell::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum MemCell {
  Table,

  Id,
  GroupId,
  GroupName,
  Participants,
  Timestamp,
  Kind,
  OriginalData,
  Summary,
  Episode,
  Subject,
  CreatedAt,
}
