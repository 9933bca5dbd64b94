use sea_orm_migration::{
  prelude::*,
  schema::{json_binary, text, timestamp_with_time_zone},
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(ClusterState::Table)
          .if_not_exists()
          .col(text(ClusterState::GroupId).primary_key())
          .col(json_binary(ClusterState::State))
          .col(timestamp_with_time_zone(ClusterState::UpdatedAt))
          .to_owned(),
      )
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(ClusterState::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum ClusterState {
  Table,

  GroupId,
  State,
  UpdatedAt,
}
